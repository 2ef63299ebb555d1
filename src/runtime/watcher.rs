//! Contract rebuilds on source changes.
//!
//! The watcher covers the whole backend tree. Changes under the contracts
//! directory start one rebuild each; there is no debouncing, so a burst of
//! saves runs that many rebuilds side by side. Everything else is only logged.

use std::path::Path;
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::models::{Contracts, ContractsLanguage};

use super::supervisor::{ProcessRole, ProcessSupervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    LogOnly,
    Rebuild,
}

/// Builds the rebuild command for a contracts subsystem.
pub type RebuildCommand = Arc<dyn Fn(&Contracts) -> Command + Send + Sync>;

/// Decide what a change at `path` should cause.
pub fn classify(path: &Path, contracts: Option<&Contracts>) -> ChangeAction {
    let Some(contracts) = contracts else {
        return ChangeAction::LogOnly;
    };
    if !path.starts_with(&contracts.dir) {
        return ChangeAction::LogOnly;
    }
    let is_build_output = contracts
        .build_output_dirs()
        .iter()
        .any(|dir| path.starts_with(dir));
    let is_dependency = path.components().any(|c| c.as_os_str() == "node_modules");
    if is_build_output || is_dependency {
        ChangeAction::LogOnly
    } else {
        ChangeAction::Rebuild
    }
}

/// Toolchain invocation for a rebuild, run in the backend directory.
pub fn rebuild_command(contracts: &Contracts) -> Command {
    let mut cmd = match contracts.language {
        ContractsLanguage::Solidity => {
            let mut cmd = Command::new("npx");
            cmd.args(["hardhat", "compile"]);
            cmd
        }
        ContractsLanguage::Rust => {
            let mut cmd = Command::new("cargo");
            cmd.args(["build", "--release", "--target", "wasm32-unknown-unknown"])
                .arg("--manifest-path")
                .arg(contracts.dir.join("Cargo.toml"));
            cmd
        }
    };
    cmd.current_dir(&contracts.backend_dir);
    cmd
}

/// Running watcher. Dropping it stops watching.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `root` recursively.
///
/// Returns `Ok(None)` without installing anything when `root` does not exist.
pub fn install(
    root: &Path,
    contracts: Option<Contracts>,
    supervisor: ProcessSupervisor,
    rebuild: RebuildCommand,
) -> notify::Result<Option<FileWatcher>> {
    if !root.is_dir() {
        info!("{} does not exist, not watching for changes", root.display());
        return Ok(None);
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.blocking_send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!("Watching {}", root.display());

    let task = tokio::spawn(async move {
        while let Some(res) = rx.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Watch error: {}", e);
                    continue;
                }
            };
            if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                continue;
            }

            let triggering = event
                .paths
                .iter()
                .find(|p| classify(p, contracts.as_ref()) == ChangeAction::Rebuild);

            match (triggering, contracts.as_ref()) {
                (Some(path), Some(contracts)) => {
                    info!("{} changed, rebuilding contracts", path.display());
                    if let Err(e) = supervisor.spawn(ProcessRole::Rebuild, rebuild(contracts)) {
                        warn!("{}", e);
                    }
                }
                _ => {
                    for path in &event.paths {
                        info!("Changed: {}", path.display());
                    }
                }
            }
        }
    });

    Ok(Some(FileWatcher {
        _watcher: watcher,
        task,
    }))
}

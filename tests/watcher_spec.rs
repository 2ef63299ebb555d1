mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use devstack::models::{Contracts, ContractsLanguage};
use devstack::runtime::supervisor::ProcessSupervisor;
use devstack::runtime::watcher::*;
use tokio::process::Command;

fn solidity(backend: &Path) -> Contracts {
    Contracts {
        language: ContractsLanguage::Solidity,
        dir: backend.join("contracts"),
        backend_dir: backend.to_path_buf(),
    }
}

mod classification {
    use super::*;

    #[test]
    fn everything_is_log_only_without_contracts() {
        let path = Path::new("/p/backend/contracts/Token.sol");
        assert_eq!(classify(path, None), ChangeAction::LogOnly);
    }

    #[test]
    fn changes_outside_the_contracts_dir_are_log_only() {
        let contracts = solidity(Path::new("/p/backend"));
        assert_eq!(
            classify(Path::new("/p/backend/src/index.js"), Some(&contracts)),
            ChangeAction::LogOnly
        );
        assert_eq!(
            classify(Path::new("/p/backend/contracts-old/Token.sol"), Some(&contracts)),
            ChangeAction::LogOnly
        );
    }

    #[test]
    fn contract_sources_trigger_a_rebuild() {
        let contracts = solidity(Path::new("/p/backend"));
        assert_eq!(
            classify(Path::new("/p/backend/contracts/Token.sol"), Some(&contracts)),
            ChangeAction::Rebuild
        );
    }

    #[test]
    fn build_output_does_not_retrigger() {
        let contracts = Contracts {
            language: ContractsLanguage::Rust,
            dir: Path::new("/p/backend/contracts").to_path_buf(),
            backend_dir: Path::new("/p/backend").to_path_buf(),
        };
        assert_eq!(
            classify(
                Path::new("/p/backend/contracts/target/wasm32-unknown-unknown/release/c.wasm"),
                Some(&contracts)
            ),
            ChangeAction::LogOnly
        );
        assert_eq!(
            classify(Path::new("/p/backend/contracts/src/lib.rs"), Some(&contracts)),
            ChangeAction::Rebuild
        );
    }

    #[test]
    fn rebuild_runs_in_the_backend_directory() {
        let contracts = solidity(Path::new("/p/backend"));
        let cmd = rebuild_command(&contracts);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "npx");
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/p/backend")));
    }
}

mod install {
    use super::*;

    #[tokio::test]
    async fn missing_tree_is_not_watched() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = install(
            &dir.path().join("backend"),
            None,
            ProcessSupervisor::new(),
            Arc::new(rebuild_command),
        )
        .expect("install should not fail");
        assert!(watcher.is_none());
    }

    #[tokio::test]
    async fn contract_change_spawns_a_rebuild() {
        let dir = common::project_dir();
        let paths = common::paths(&dir);
        let backend = paths.backend_dir("backend");
        fs::create_dir_all(backend.join("contracts")).unwrap();

        let marker = paths.project_dir().join("rebuilt");
        let marker_for_cmd = marker.clone();
        let rebuild: RebuildCommand = Arc::new(move |_contracts| {
            let mut cmd = Command::new("touch");
            cmd.arg(&marker_for_cmd);
            cmd
        });

        let watcher = install(&backend, Some(solidity(&backend)), ProcessSupervisor::new(), rebuild)
            .expect("install failed");
        assert!(watcher.is_some());

        // Give the watcher a moment to settle before writing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(backend.join("contracts/Token.sol"), "contract Token {}").unwrap();

        for _ in 0..100 {
            if marker.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("rebuild was not triggered");
    }

    #[tokio::test]
    async fn other_changes_do_not_rebuild() {
        let dir = common::project_dir();
        let paths = common::paths(&dir);
        let backend = paths.backend_dir("backend");
        fs::create_dir_all(backend.join("contracts")).unwrap();

        let marker = paths.project_dir().join("rebuilt");
        let marker_for_cmd = marker.clone();
        let rebuild: RebuildCommand = Arc::new(move |_contracts| {
            let mut cmd = Command::new("touch");
            cmd.arg(&marker_for_cmd);
            cmd
        });

        let _watcher = install(&backend, Some(solidity(&backend)), ProcessSupervisor::new(), rebuild)
            .expect("install failed");
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(backend.join("server.js"), "module.exports = {}").unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!marker.exists());
    }
}

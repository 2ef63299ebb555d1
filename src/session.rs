//! The start sequence and its hand-off to shutdown.
//!
//! Ordering within [`Session::start`]:
//!
//! 1. prerequisites (container runtime, tunnel client, frontend directory)
//! 2. synthesis of every generated file, in memory
//! 3. writing those files
//! 4. `up`, then the log follower
//! 5. the file watcher
//! 6. readiness gate, only when both backend and frontend run
//! 7. frontend dev server, then the tunnel

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

use crate::credentials::ResolvedCredentials;
use crate::models::ProjectDescriptor;
use crate::paths::Paths;
use crate::runtime::container::{ContainerError, ContainerRuntime};
use crate::runtime::readiness::{HttpProbe, Probe, ReadinessCheck, ReadinessError, ReadinessProber};
use crate::runtime::shutdown::ShutdownCoordinator;
use crate::runtime::supervisor::{ProcessRole, ProcessSupervisor, SupervisorError};
use crate::runtime::watcher::{self, FileWatcher, RebuildCommand};
use crate::runtime::tool_available;
use crate::synth::compose::SERVER_PORT;
use crate::synth::{Artifacts, SynthError};

const TUNNEL_CLIENT: &str = "ngrok";

#[derive(Debug, Error)]
pub enum StartError {
    #[error("Required tool not found: {0}")]
    MissingTool(String),

    #[error("Directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Frontend command is empty")]
    EmptyFrontendCommand,

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error("Failed to write generated files: {0:#}")]
    Write(anyhow::Error),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Per-start switches.
#[derive(Clone)]
pub struct StartOptions {
    /// Expose the server through a public tunnel.
    pub tunnel: bool,
    pub readiness: ReadinessCheck,
    pub rebuild: RebuildCommand,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            tunnel: false,
            readiness: ReadinessCheck::default(),
            rebuild: Arc::new(watcher::rebuild_command),
        }
    }
}

pub struct Session<R, P = HttpProbe> {
    paths: Paths,
    project: ProjectDescriptor,
    credentials: ResolvedCredentials,
    runtime: Arc<R>,
    probe: P,
    supervisor: ProcessSupervisor,
    options: StartOptions,
    watcher: Option<FileWatcher>,
    up_attempted: bool,
}

impl<R: ContainerRuntime> Session<R, HttpProbe> {
    pub fn new(
        paths: Paths,
        project: ProjectDescriptor,
        credentials: ResolvedCredentials,
        runtime: R,
        options: StartOptions,
    ) -> Self {
        Self {
            paths,
            project,
            credentials,
            runtime: Arc::new(runtime),
            probe: HttpProbe::default(),
            supervisor: ProcessSupervisor::new(),
            options,
            watcher: None,
            up_attempted: false,
        }
    }
}

impl<R: ContainerRuntime, P: Probe> Session<R, P> {
    pub fn with_probe<Q: Probe>(self, probe: Q) -> Session<R, Q> {
        Session {
            paths: self.paths,
            project: self.project,
            credentials: self.credentials,
            runtime: self.runtime,
            probe,
            supervisor: self.supervisor,
            options: self.options,
            watcher: self.watcher,
            up_attempted: self.up_attempted,
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Whether anything was started that shutdown has to undo.
    pub fn needs_teardown(&self) -> bool {
        self.up_attempted || !self.supervisor.is_empty()
    }

    pub fn coordinator(&self) -> ShutdownCoordinator<R> {
        ShutdownCoordinator::new(
            self.supervisor.clone(),
            self.runtime.clone(),
            self.paths.namespace(),
            self.project.runs_backend(),
        )
    }

    async fn check_prerequisites(&self) -> Result<(), StartError> {
        if self.project.runs_backend() {
            self.runtime.check_available().await?;
            if self.options.tunnel && !tool_available(TUNNEL_CLIENT, &["version"]).await {
                return Err(StartError::MissingTool(TUNNEL_CLIENT.to_string()));
            }
        }
        if self.project.runs_frontend() {
            let dir = self.paths.frontend_dir(&self.project.frontend.dir);
            if !dir.is_dir() {
                return Err(StartError::MissingDirectory(dir));
            }
            if self.project.frontend.command.is_empty() {
                return Err(StartError::EmptyFrontendCommand);
            }
        }
        Ok(())
    }

    /// Bring the environment up. Returns once everything has been launched.
    pub async fn start(&mut self) -> Result<(), StartError> {
        self.check_prerequisites().await?;

        let artifacts = Artifacts::synthesize(&self.paths, &self.project, &self.credentials)?;
        artifacts
            .write(&self.paths, &self.project)
            .map_err(StartError::Write)?;

        let namespace = self.paths.namespace().to_string();
        if self.project.runs_backend() {
            self.up_attempted = true;
            self.runtime.up(&namespace, &self.paths.compose_file()).await?;

            if let Some(cmd) = self.runtime.log_follower(&namespace) {
                if let Err(e) = self.supervisor.spawn(ProcessRole::LogFollower, cmd) {
                    warn!("Log follower not started: {}", e);
                }
            }
        }

        self.install_watcher();

        if self.project.runs_frontend() {
            if self.project.runs_backend() {
                ReadinessProber::new(self.options.readiness.clone(), &self.probe)
                    .wait_ready()
                    .await?;
            }
            self.supervisor
                .spawn(ProcessRole::Frontend, self.frontend_command())?;
        }

        if self.options.tunnel {
            if self.project.runs_backend() {
                let mut cmd = Command::new(TUNNEL_CLIENT);
                cmd.args(["http", &SERVER_PORT.to_string()]);
                self.supervisor.spawn(ProcessRole::Tunnel, cmd)?;
            } else {
                warn!("Tunnel requested but backend is not running, skipping");
            }
        }

        Ok(())
    }

    fn install_watcher(&mut self) {
        // Already validated by synthesis.
        let contracts = self
            .project
            .resolve_contracts(self.paths.project_dir())
            .ok()
            .flatten();
        let root = self.paths.backend_dir(&self.project.backend_dir);

        match watcher::install(
            &root,
            contracts,
            self.supervisor.clone(),
            self.options.rebuild.clone(),
        ) {
            Ok(watcher) => self.watcher = watcher,
            Err(e) => warn!("Not watching {}: {}", root.display(), e),
        }
    }

    fn frontend_command(&self) -> Command {
        let frontend = &self.project.frontend;
        let mut cmd = Command::new(&frontend.command[0]);
        cmd.args(&frontend.command[1..])
            .current_dir(self.paths.frontend_dir(&frontend.dir));
        if self.project.runs_backend() {
            cmd.env("API_URL", format!("http://localhost:{}", SERVER_PORT));
        }
        cmd
    }
}

/// Source of the request to stop a running session.
#[allow(async_fn_in_trait)]
pub trait Termination {
    /// Resolves when the session should stop. Called again after a start
    /// completes, so it must be re-armable.
    async fn recv(&mut self);
}

/// SIGINT and SIGTERM, registered once.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl TerminationSignals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

impl Termination for TerminationSignals {
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received SIGINT"),
            _ = self.terminate.recv() => info!("Received SIGTERM"),
        }
    }
}

/// Start the session, wait for a termination signal, shut down.
///
/// Returns the process exit code: 0 after a graceful stop, 1 when the start
/// failed. Failures before anything was launched skip the teardown.
pub async fn run<R: ContainerRuntime, P: Probe, T: Termination>(
    mut session: Session<R, P>,
    mut signals: T,
) -> i32 {
    let coordinator = session.coordinator();

    let started = tokio::select! {
        result = session.start() => Some(result),
        _ = signals.recv() => None,
    };

    let exit_code = match started {
        Some(Ok(())) => {
            info!("Environment is up, press Ctrl-C to stop");
            signals.recv().await;
            0
        }
        Some(Err(e)) => {
            error!("Start failed: {}", e);
            eprintln!("error: {}", e);
            if !session.needs_teardown() {
                return 1;
            }
            1
        }
        // Interrupted mid-start: tear down whatever got launched.
        None if session.needs_teardown() => 0,
        None => return 0,
    };

    let report = coordinator.run(exit_code).await;
    for e in &report.errors {
        warn!("Shutdown step failed: {}", e);
    }
    report.exit_code
}

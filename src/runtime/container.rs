//! Container lifecycle through `docker compose`.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container runtime not available: {0}")]
    Unavailable(String),

    #[error("`{command}` failed with {status}")]
    Failed { command: String, status: String },

    #[error("Failed to run container runtime: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations against the container runtime, all scoped to a namespace.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    async fn check_available(&self) -> Result<(), ContainerError>;

    /// Apply the descriptor at `descriptor`, detached.
    async fn up(&self, namespace: &str, descriptor: &Path) -> Result<(), ContainerError>;

    /// Remove everything under `namespace`. Succeeds when nothing is running.
    async fn down(&self, namespace: &str) -> Result<(), ContainerError>;

    /// Command that streams service logs until terminated, if supported.
    fn log_follower(&self, namespace: &str) -> Option<Command>;
}

/// [`ContainerRuntime`] backed by the `docker compose` plugin.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: String,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCompose {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn compose(&self, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compose").arg("-p").arg(namespace);
        cmd
    }

    async fn run(&self, mut cmd: Command, description: String) -> Result<(), ContainerError> {
        debug!("Running {}", description);
        let status = cmd.stdin(Stdio::null()).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(ContainerError::Failed {
                command: description,
                status: status.to_string(),
            })
        }
    }
}

impl ContainerRuntime for DockerCompose {
    async fn check_available(&self) -> Result<(), ContainerError> {
        let status = Command::new(&self.program)
            .args(["compose", "version"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => Err(ContainerError::Unavailable(format!(
                "`{} compose` is not installed",
                self.program
            ))),
            Err(e) => Err(ContainerError::Unavailable(format!("{}: {}", self.program, e))),
        }
    }

    async fn up(&self, namespace: &str, descriptor: &Path) -> Result<(), ContainerError> {
        info!("Starting services under {}", namespace);
        let mut cmd = self.compose(namespace);
        cmd.arg("-f").arg(descriptor).args(["up", "-d", "--build"]);
        self.run(cmd, format!("{} compose -p {} up", self.program, namespace))
            .await
    }

    async fn down(&self, namespace: &str) -> Result<(), ContainerError> {
        info!("Stopping services under {}", namespace);
        let mut cmd = self.compose(namespace);
        cmd.args(["down", "--remove-orphans"]);
        self.run(cmd, format!("{} compose -p {} down", self.program, namespace))
            .await
    }

    fn log_follower(&self, namespace: &str) -> Option<Command> {
        let mut cmd = self.compose(namespace);
        cmd.args(["logs", "--follow", "--no-color", "--tail", "50"]);
        Some(cmd)
    }
}

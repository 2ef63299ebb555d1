#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use devstack::models::{ProjectDescriptor, RunTarget};
use devstack::paths::Paths;
use devstack::runtime::container::{ContainerError, ContainerRuntime};
use tempfile::TempDir;
use tokio::process::Command;

/// Container runtime that records calls instead of running anything.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    pub log: Mutex<Vec<String>>,
    pub fail_up: bool,
    pub fail_down: bool,
    pub unavailable: bool,
}

impl RecordingRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) {
        self.log.lock().expect("calls lock").push(call);
    }
}

impl ContainerRuntime for RecordingRuntime {
    async fn check_available(&self) -> Result<(), ContainerError> {
        if self.unavailable {
            Err(ContainerError::Unavailable("docker not found".to_string()))
        } else {
            Ok(())
        }
    }

    async fn up(&self, namespace: &str, descriptor: &Path) -> Result<(), ContainerError> {
        self.record(format!("up {} {}", namespace, descriptor.display()));
        if self.fail_up {
            return Err(ContainerError::Failed {
                command: "compose up".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    async fn down(&self, namespace: &str) -> Result<(), ContainerError> {
        self.record(format!("down {}", namespace));
        if self.fail_down {
            return Err(ContainerError::Failed {
                command: "compose down".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    fn log_follower(&self, _namespace: &str) -> Option<Command> {
        None
    }
}

/// Temporary project directory with empty `backend/` and `frontend/` trees.
pub fn project_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::create_dir_all(dir.path().join("backend")).expect("Failed to create backend dir");
    fs::create_dir_all(dir.path().join("frontend")).expect("Failed to create frontend dir");
    dir
}

pub fn paths(dir: &TempDir) -> Paths {
    Paths::new(dir.path()).expect("Failed to build paths")
}

pub fn project_running(targets: &[RunTarget]) -> ProjectDescriptor {
    ProjectDescriptor {
        run: targets.iter().copied().collect(),
        ..Default::default()
    }
}

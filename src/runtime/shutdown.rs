//! Coordinated teardown.
//!
//! [`ShutdownCoordinator::run`] executes at most once per process. Each step is
//! isolated: a failure is logged and the next step still runs.
//!
//! 1. Signal the frontend dev server and wait for it (bounded).
//! 2. Signal log followers and tunnels without waiting.
//! 3. If backend was requested, take the containers down.
//! 4. Hand back the exit code for the caller to exit with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::container::ContainerRuntime;
use super::supervisor::{NixSignaller, ProcessRole, ProcessSupervisor, Signaller};

/// How long the frontend gets to exit after being signalled.
pub const FRONTEND_GRACE: Duration = Duration::from_secs(5);

/// What a shutdown run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub exit_code: i32,
    /// False when this call found shutdown already done.
    pub performed: bool,
    pub frontends_signalled: usize,
    pub followers_signalled: usize,
    pub containers_down: bool,
    /// Step failures, in order.
    pub errors: Vec<String>,
}

pub struct ShutdownCoordinator<R, S = NixSignaller> {
    supervisor: ProcessSupervisor,
    runtime: Arc<R>,
    namespace: String,
    backend_requested: bool,
    signaller: S,
    grace: Duration,
    fired: AtomicBool,
}

impl<R: ContainerRuntime> ShutdownCoordinator<R, NixSignaller> {
    pub fn new(
        supervisor: ProcessSupervisor,
        runtime: Arc<R>,
        namespace: impl Into<String>,
        backend_requested: bool,
    ) -> Self {
        Self::with_signaller(supervisor, runtime, namespace, backend_requested, NixSignaller)
    }
}

impl<R: ContainerRuntime, S: Signaller> ShutdownCoordinator<R, S> {
    pub fn with_signaller(
        supervisor: ProcessSupervisor,
        runtime: Arc<R>,
        namespace: impl Into<String>,
        backend_requested: bool,
        signaller: S,
    ) -> Self {
        Self {
            supervisor,
            runtime,
            namespace: namespace.into(),
            backend_requested,
            signaller,
            grace: FRONTEND_GRACE,
            fired: AtomicBool::new(false),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn has_run(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Tear everything down and return `exit_code`.
    pub async fn run(&self, exit_code: i32) -> ShutdownReport {
        let mut report = ShutdownReport {
            exit_code,
            ..Default::default()
        };
        if self.fired.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already ran");
            return report;
        }
        report.performed = true;
        info!("Shutting down");

        let processes = self.supervisor.snapshot();

        for mut frontend in processes
            .iter()
            .filter(|p| p.role == ProcessRole::Frontend)
            .cloned()
        {
            match self.signaller.send(frontend.pid, frontend.signal) {
                Ok(()) => {
                    report.frontends_signalled += 1;
                    if tokio::time::timeout(self.grace, frontend.wait()).await.is_err() {
                        warn!("Frontend dev server (pid {}) did not exit in time", frontend.pid);
                    }
                }
                Err(e) => {
                    error!("{}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        for follower in processes
            .iter()
            .filter(|p| matches!(p.role, ProcessRole::LogFollower | ProcessRole::Tunnel))
        {
            match self.signaller.send(follower.pid, follower.signal) {
                Ok(()) => report.followers_signalled += 1,
                Err(e) => {
                    warn!("{}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        if self.backend_requested {
            match self.runtime.down(&self.namespace).await {
                Ok(()) => report.containers_down = true,
                Err(e) => {
                    error!("Failed to stop services: {}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        report
    }
}

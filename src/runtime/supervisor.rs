//! Supervision of OS processes that run outside the container runtime.
//!
//! The supervisor owns a registry of [`ManagedProcess`] handles. Spawned
//! processes get a monitor task that waits for their exit, reports it
//! according to the process role and removes the entry again. Shutdown reads
//! the registry through [`ProcessSupervisor::snapshot`], which copies it under
//! one lock so registrations racing with a signal are either fully in or out.

use std::collections::BTreeMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub type ProcessId = u64;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn {role}: {source}")]
    Spawn {
        role: ProcessRole,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} exited before its pid could be read")]
    NoPid(ProcessRole),

    #[error("Failed to send {signal:?} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: nix::errno::Errno,
    },
}

/// What a supervised process is for. Determines how its exit is reported and
/// how it is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// Streams container logs to the terminal. Best effort.
    LogFollower,
    /// Frontend dev server.
    Frontend,
    /// One contracts rebuild, triggered by a file change.
    Rebuild,
    /// Public tunnel to the application server.
    Tunnel,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogFollower => "log follower",
            Self::Frontend => "frontend dev server",
            Self::Rebuild => "contracts rebuild",
            Self::Tunnel => "tunnel",
        }
    }

    /// Signal the process expects when asked to stop.
    ///
    /// Dev servers treat SIGINT like Ctrl-C and clean up their watchers; the
    /// rest stop on SIGTERM.
    pub fn termination_signal(&self) -> Signal {
        match self {
            Self::Frontend => Signal::SIGINT,
            Self::LogFollower | Self::Rebuild | Self::Tunnel => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one supervised process.
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    pub role: ProcessRole,
    pub pid: u32,
    /// Signal to send at shutdown.
    pub signal: Signal,
    exit: watch::Receiver<Option<ExitStatus>>,
}

/// Sending half of a [`ManagedProcess`] exit notification.
#[derive(Debug)]
pub struct ExitNotifier(watch::Sender<Option<ExitStatus>>);

impl ExitNotifier {
    pub fn notify(self, status: ExitStatus) {
        let _ = self.0.send(Some(status));
    }
}

impl ManagedProcess {
    /// Create a handle for an already running process.
    ///
    /// The returned notifier must be fired (or dropped) when the process exits.
    pub fn new(role: ProcessRole, pid: u32, signal: Signal) -> (Self, ExitNotifier) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                role,
                pid,
                signal,
                exit: rx,
            },
            ExitNotifier(tx),
        )
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some() || self.exit.has_changed().is_err()
    }

    /// Wait for the process to exit. `None` if the exit status is unknown.
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        match self.exit.wait_for(|status| status.is_some()).await {
            Ok(status) => *status,
            Err(_) => None,
        }
    }
}

/// Delivery of termination signals.
pub trait Signaller: Send + Sync {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), SupervisorError>;
}

/// [`Signaller`] using `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixSignaller;

impl Signaller for NixSignaller {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), SupervisorError> {
        let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
            pid,
            signal,
            source: nix::errno::Errno::EINVAL,
        })?;
        kill(Pid::from_raw(raw), signal).map_err(|source| SupervisorError::Signal {
            pid,
            signal,
            source,
        })
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: ProcessId,
    entries: BTreeMap<ProcessId, ManagedProcess>,
}

/// Registry and spawner of [`ManagedProcess`]es. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    registry: Arc<Mutex<Registry>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        // Nothing panics while holding the lock, so poisoning cannot leave
        // the map half-updated.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, process: ManagedProcess) -> ProcessId {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        debug!("Registered {} (pid {}) as #{}", process.role, process.pid, id);
        registry.entries.insert(id, process);
        id
    }

    pub fn unregister(&self, id: ProcessId) -> Option<ManagedProcess> {
        self.lock().entries.remove(&id)
    }

    /// Copy of all registered processes, in registration order.
    pub fn snapshot(&self) -> Vec<ManagedProcess> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn by_role(&self, role: ProcessRole) -> Vec<ManagedProcess> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.role == role)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Spawn `command`, register it under `role` and watch for its exit.
    ///
    /// Output goes straight to the controlling terminal. Only the frontend
    /// keeps stdin.
    pub fn spawn(
        &self,
        role: ProcessRole,
        mut command: Command,
    ) -> Result<ManagedProcess, SupervisorError> {
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        if role != ProcessRole::Frontend {
            command.stdin(Stdio::null());
        }

        let mut child = command
            .spawn()
            .map_err(|source| SupervisorError::Spawn { role, source })?;
        let pid = child.id().ok_or(SupervisorError::NoPid(role))?;

        let (process, notifier) = ManagedProcess::new(role, pid, role.termination_signal());
        let id = self.register(process.clone());
        info!("Started {} (pid {})", role, pid);

        let supervisor = self.clone();
        tokio::spawn(async move {
            let result = child.wait().await;
            supervisor.unregister(id);
            match result {
                Ok(status) => {
                    report_exit(role, pid, status);
                    notifier.notify(status);
                }
                Err(e) => warn!("Lost track of {} (pid {}): {}", role, pid, e),
            }
        });

        Ok(process)
    }
}

fn report_exit(role: ProcessRole, pid: u32, status: ExitStatus) {
    match role {
        ProcessRole::Frontend => info!("Frontend dev server (pid {}) exited: {}", pid, status),
        ProcessRole::Rebuild if status.success() => info!("Contracts rebuild succeeded"),
        ProcessRole::Rebuild => warn!("Contracts rebuild failed: {}", status),
        _ if status.success() => debug!("{} (pid {}) exited", role, pid),
        _ => warn!("{} (pid {}) exited abnormally: {}", role, pid, status),
    }
}

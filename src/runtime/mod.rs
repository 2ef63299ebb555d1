//! Everything that runs or stops something.
//!
//! - [`container`]: `up`/`down` against the container runtime
//! - [`supervisor`]: OS processes living outside the container runtime
//! - [`readiness`]: bounded polling of the server's health endpoint
//! - [`watcher`]: contract rebuilds on source changes
//! - [`shutdown`]: the single teardown routine

pub mod container;
pub mod readiness;
pub mod shutdown;
pub mod supervisor;
pub mod watcher;

use std::process::Stdio;

use tokio::process::Command;

/// Check that `program` can be executed by running it with `args`.
pub async fn tool_available(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

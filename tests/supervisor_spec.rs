use std::time::Duration;

use devstack::runtime::supervisor::*;
use nix::sys::signal::Signal;
use tokio::process::Command;

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", script]);
    cmd
}

async fn wait_until_empty(supervisor: &ProcessSupervisor) {
    for _ in 0..200 {
        if supervisor.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("processes still registered: {:?}", supervisor.snapshot());
}

mod registry {
    use super::*;

    #[test]
    fn register_and_unregister_round_trip() {
        let supervisor = ProcessSupervisor::new();
        let (frontend, _n1) = ManagedProcess::new(ProcessRole::Frontend, 100, Signal::SIGINT);
        let (follower, _n2) = ManagedProcess::new(ProcessRole::LogFollower, 200, Signal::SIGTERM);

        let a = supervisor.register(frontend);
        let b = supervisor.register(follower);
        assert_ne!(a, b);

        let snapshot = supervisor.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, ProcessRole::Frontend);
        assert_eq!(snapshot[1].role, ProcessRole::LogFollower);

        assert_eq!(supervisor.unregister(a).map(|p| p.pid), Some(100));
        assert!(supervisor.unregister(a).is_none());
        assert_eq!(supervisor.by_role(ProcessRole::LogFollower).len(), 1);
    }

    #[test]
    fn roles_carry_their_termination_signal() {
        assert_eq!(ProcessRole::Frontend.termination_signal(), Signal::SIGINT);
        assert_eq!(ProcessRole::LogFollower.termination_signal(), Signal::SIGTERM);
        assert_eq!(ProcessRole::Rebuild.termination_signal(), Signal::SIGTERM);
    }

    #[tokio::test]
    async fn dropped_notifier_ends_wait() {
        let (mut process, notifier) = ManagedProcess::new(ProcessRole::Frontend, 1, Signal::SIGINT);
        drop(notifier);
        assert_eq!(process.wait().await, None);
        assert!(process.has_exited());
    }
}

mod spawning {
    use super::*;

    #[tokio::test]
    async fn spawned_process_is_registered_until_it_exits() {
        let supervisor = ProcessSupervisor::new();
        let mut process = supervisor
            .spawn(ProcessRole::Frontend, sh("sleep 0.2"))
            .expect("spawn failed");

        assert_eq!(process.signal, Signal::SIGINT);
        assert_eq!(supervisor.by_role(ProcessRole::Frontend).len(), 1);

        let status = process.wait().await.expect("exit status");
        assert!(status.success());
        wait_until_empty(&supervisor).await;
    }

    #[tokio::test]
    async fn failing_rebuild_is_contained() {
        let supervisor = ProcessSupervisor::new();
        let mut rebuild = supervisor.spawn(ProcessRole::Rebuild, sh("exit 3")).unwrap();

        let status = rebuild.wait().await.expect("exit status");
        assert_eq!(status.code(), Some(3));
        wait_until_empty(&supervisor).await;
    }

    #[tokio::test]
    async fn concurrent_rebuilds_run_independently() {
        let supervisor = ProcessSupervisor::new();
        let mut slow = supervisor.spawn(ProcessRole::Rebuild, sh("sleep 0.3; exit 1")).unwrap();
        let mut fast = supervisor.spawn(ProcessRole::Rebuild, sh("exit 0")).unwrap();

        assert!(fast.wait().await.unwrap().success());
        assert!(!slow.has_exited());
        assert!(!slow.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn unknown_program_is_a_spawn_error() {
        let supervisor = ProcessSupervisor::new();
        let err = supervisor
            .spawn(ProcessRole::LogFollower, Command::new("no-such-program-devstack"))
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { role: ProcessRole::LogFollower, .. }));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn nix_signaller_stops_a_process() {
        let supervisor = ProcessSupervisor::new();
        let mut sleep = Command::new("sleep");
        sleep.arg("30");
        let mut process = supervisor.spawn(ProcessRole::Tunnel, sleep).unwrap();

        NixSignaller.send(process.pid, process.signal).expect("signal failed");
        let status = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("process did not exit")
            .expect("exit status");
        assert!(!status.success());
    }
}

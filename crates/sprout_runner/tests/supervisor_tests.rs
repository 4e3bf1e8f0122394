//! Integration tests for the build supervisor.
//!
//! Mock-runner tests cover the step contract; the unix-only tests drive
//! real shell commands so spawn, log redirection and stop are exercised.

use std::sync::Arc;
use std::time::Duration;

use sprout_runner::{
    BuildConfig, BuildFailure, BuildStep, BuildSupervisor, FnHealthCheck, MockResponse,
    MockRunner, ProcessRunner,
};
use tempfile::TempDir;

fn fast(config: BuildConfig) -> BuildConfig {
    config
        .health_timeout(Duration::from_millis(50))
        .poll_interval(Duration::from_millis(5))
        .stop_grace(Duration::from_millis(500))
}

/// A failing build step stops the cycle before the server is started.
#[tokio::test]
async fn test_build_failure_after_install() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new().with_responses(vec![
        MockResponse::success("added 312 packages"),
        MockResponse::failure(1, "Module not found: Can't resolve 'tailwindcss'"),
    ]);
    let supervisor = BuildSupervisor::new(Arc::new(runner.clone()), fast(BuildConfig::default()));

    let outcome = supervisor.build(dir.path(), &FnHealthCheck(|| true)).await;

    assert!(!outcome.success);
    assert!(outcome.logs.contains("added 312 packages"));
    match outcome.error {
        Some(BuildFailure::CommandFailed { step, exit_code, stderr }) => {
            assert_eq!(step, BuildStep::Build);
            assert_eq!(exit_code, 1);
            assert!(stderr.contains("tailwindcss"));
        }
        other => panic!("unexpected failure: {:?}", other),
    }
    assert!(!runner.was_called("spawn"));
}

/// Commands run in the workspace directory.
#[tokio::test]
async fn test_commands_run_in_workspace() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let supervisor = BuildSupervisor::new(Arc::new(runner.clone()), fast(BuildConfig::default()));

    supervisor.build(dir.path(), &FnHealthCheck(|| true)).await;

    for call in runner.get_calls() {
        if let Some(cwd) = call.cwd {
            assert_eq!(cwd, dir.path());
        }
    }
}

/// Spawn failures are reported without a pid.
#[tokio::test]
async fn test_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new().fail_spawn("npm: not found");
    let supervisor = BuildSupervisor::new(Arc::new(runner), fast(BuildConfig::default()));

    let outcome = supervisor.build(dir.path(), &FnHealthCheck(|| true)).await;

    assert!(!outcome.success);
    assert!(outcome.process_id.is_none());
    assert!(matches!(outcome.error, Some(BuildFailure::SpawnFailed(_))));
}

#[cfg(unix)]
mod system {
    use super::*;
    use sprout_runner::SystemRunner;

    fn shell_config() -> BuildConfig {
        fast(
            BuildConfig::default()
                .install(&["sh", "-c", "echo installing"])
                .build(&["sh", "-c", "echo building"])
                .serve(&["sh", "-c", "echo serving; sleep 30"]),
        )
    }

    #[tokio::test]
    async fn test_real_cycle_and_stop() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(SystemRunner::new());
        let supervisor = BuildSupervisor::new(runner.clone(), shell_config());

        let outcome = supervisor.build(dir.path(), &FnHealthCheck(|| true)).await;
        assert!(outcome.success, "logs: {}", outcome.logs);
        assert!(outcome.logs.contains("installing"));
        assert!(outcome.logs.contains("building"));

        let pid = outcome.process_id.unwrap();
        assert!(runner.is_alive(pid).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        supervisor.stop(pid).await.unwrap();
        assert!(!runner.is_alive(pid).await);
        supervisor.stop(pid).await.unwrap();

        let server_log = std::fs::read_to_string(dir.path().join("dev_server.log")).unwrap();
        assert!(server_log.contains("serving"));
    }

    #[tokio::test]
    async fn test_real_install_failure() {
        let dir = TempDir::new().unwrap();
        let config = shell_config().install(&["sh", "-c", "echo broken >&2; exit 7"]);
        let supervisor = BuildSupervisor::new(Arc::new(SystemRunner::new()), config);

        let outcome = supervisor.build(dir.path(), &FnHealthCheck(|| true)).await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error,
            Some(BuildFailure::CommandFailed {
                step: BuildStep::Install,
                exit_code: 7,
                stderr: "broken\n".to_string(),
            })
        );
    }
}

//! Mock process runner for testing.
//!
//! Provides a configurable mock implementation of the ProcessRunner trait
//! for use in unit tests without running npm or spawning servers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandOutput, ProcessRunner};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub argv: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub pid: Option<u32>,
}

/// Mock process runner for testing.
///
/// Responses are consumed in order; once the queue is exhausted every
/// further command succeeds with empty output. Spawned "processes" are
/// tracked in a live set that `stop` and `kill_process` remove from.
#[derive(Clone)]
pub struct MockRunner {
    responses: Arc<RwLock<Vec<MockResponse>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    live: Arc<RwLock<HashMap<u32, PathBuf>>>,
    next_pid: Arc<AtomicU32>,
    spawn_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(Vec::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            live: Arc::new(RwLock::new(HashMap::new())),
            next_pid: Arc::new(AtomicU32::new(4000)),
            spawn_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue a response for the next `run` call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Replace the response queue.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Make every `spawn` call fail.
    pub fn fail_spawn(self, message: impl Into<String>) -> Self {
        *self.spawn_failure.write() = Some(message.into());
        self
    }

    /// Simulate a spawned process exiting on its own.
    pub fn kill_process(&self, pid: u32) {
        self.live.write().remove(&pid);
    }

    /// Pids of processes still "running".
    pub fn live_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.live.read().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.write();
        if responses.is_empty() {
            MockResponse::success("")
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, command: &CommandSpec) -> RunnerResult<CommandOutput> {
        self.record_call(CapturedCall {
            method: "run".to_string(),
            argv: Some(command.argv.clone()),
            cwd: Some(command.cwd.clone()),
            pid: None,
        });

        if command.argv.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }

        let response = self.next_response();
        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at: Utc::now(),
            duration_ms: 0,
        })
    }

    async fn spawn(&self, argv: &[String], cwd: &Path, log_file: &Path) -> RunnerResult<u32> {
        self.record_call(CapturedCall {
            method: "spawn".to_string(),
            argv: Some(argv.to_vec()),
            cwd: Some(cwd.to_path_buf()),
            pid: None,
        });

        if let Some(message) = self.spawn_failure.read().clone() {
            return Err(RunnerError::SpawnFailed {
                program: argv.first().cloned().unwrap_or_default(),
                message,
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.live.write().insert(pid, log_file.to_path_buf());
        Ok(pid)
    }

    async fn stop(&self, pid: u32, _grace: Duration) -> RunnerResult<()> {
        self.record_call(CapturedCall {
            method: "stop".to_string(),
            argv: None,
            cwd: None,
            pid: Some(pid),
        });
        self.live.write().remove(&pid);
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.live.read().contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_sequential_responses() {
        let runner = MockRunner::new().with_responses(vec![
            MockResponse::failure(1, "npm ERR! missing script: build"),
            MockResponse::success("installed"),
        ]);
        let cmd = CommandSpec::new(vec!["npm".to_string(), "install".to_string()], "/tmp");

        let r1 = runner.run(&cmd).await.unwrap();
        assert_eq!(r1.exit_code, 1);
        assert_eq!(r1.stderr, "npm ERR! missing script: build");

        let r2 = runner.run(&cmd).await.unwrap();
        assert!(r2.success());
        assert_eq!(r2.stdout, "installed");

        // Exhausted queue falls back to success.
        let r3 = runner.run(&cmd).await.unwrap();
        assert!(r3.success());
        assert_eq!(runner.get_method_calls("run").len(), 3);
    }

    #[tokio::test]
    async fn test_mock_runner_process_lifecycle() {
        let runner = MockRunner::new();
        let argv = vec!["npm".to_string(), "run".to_string(), "dev".to_string()];

        let pid = runner
            .spawn(&argv, Path::new("/tmp"), Path::new("/tmp/dev.log"))
            .await
            .unwrap();
        assert!(runner.is_alive(pid).await);
        assert_eq!(runner.live_pids(), vec![pid]);

        runner.stop(pid, Duration::from_millis(10)).await.unwrap();
        assert!(!runner.is_alive(pid).await);

        // Idempotent
        runner.stop(pid, Duration::from_millis(10)).await.unwrap();
        assert_eq!(runner.get_method_calls("stop").len(), 2);
    }

    #[tokio::test]
    async fn test_mock_runner_spawn_failure() {
        let runner = MockRunner::new().fail_spawn("no npm");
        let result = runner
            .spawn(&["npm".to_string()], Path::new("/tmp"), Path::new("/tmp/dev.log"))
            .await;
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
        assert!(runner.was_called("spawn"));
    }
}

//! Process runner trait and types.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CommandSpec;
use crate::error::RunnerResult;

/// Result of a finished command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Process runner trait.
///
/// Abstracts everything the build supervisor does with the operating
/// system so pipelines can be exercised without spawning real processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit code is not an error; exceeding the timeout is.
    async fn run(&self, command: &CommandSpec) -> RunnerResult<CommandOutput>;

    /// Spawn a long-running command detached from the caller.
    ///
    /// Combined stdout/stderr is appended to `log_file`. Returns the pid
    /// without waiting for the process to exit.
    async fn spawn(&self, argv: &[String], cwd: &Path, log_file: &Path) -> RunnerResult<u32>;

    /// Stop a process: graceful terminate, then force-kill after `grace`.
    ///
    /// Stopping a process that is already gone is not an error.
    async fn stop(&self, pid: u32, grace: Duration) -> RunnerResult<()>;

    /// Check whether a process is still running.
    async fn is_alive(&self, pid: u32) -> bool;
}

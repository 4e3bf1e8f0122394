//! Operating-system backed process runner.
//!
//! Commands run through `std::process` on a blocking worker thread. Servers
//! are spawned into their own process group so that stopping them also
//! takes down the children they fork (`npm run dev` starts `next`, which
//! starts node workers).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandOutput, ProcessRunner};

const WAIT_TICK: Duration = Duration::from_millis(100);

/// Runner that executes real processes.
#[derive(Clone, Default)]
pub struct SystemRunner {
    /// Spawned servers, kept so they can be reaped once they exit.
    children: Arc<Mutex<HashMap<u32, Child>>>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a command and capture its output, enforcing the timeout.
    fn execute_blocking(command: &CommandSpec) -> RunnerResult<CommandOutput> {
        let program = command.program().ok_or(RunnerError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(&command.argv[1..]);
        cmd.current_dir(&command.cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Own group, so a timeout also takes down whatever npm forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!("Executing: {} (cwd={:?})", command.display(), command.cwd);

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        // Drain both pipes concurrently so a chatty process cannot block on a full pipe.
        let stdout_handle = child.stdout.take().map(|mut out| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = out.read_to_string(&mut buf);
                buf
            })
        });
        let stderr_handle = child.stderr.take().map(|mut err| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = err.read_to_string(&mut buf);
                buf
            })
        });

        let status = if command.timeout_seconds > 0 {
            let timeout = Duration::from_secs(command.timeout_seconds);
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) => {
                        if start.elapsed() > timeout {
                            warn!(
                                "Command '{}' exceeded {}s, killing",
                                command.display(),
                                command.timeout_seconds
                            );
                            #[cfg(unix)]
                            if let Err(e) = signal_group(child.id(), true) {
                                debug!("Could not kill process group {}: {}", child.id(), e);
                            }
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(RunnerError::Timeout(command.timeout_seconds));
                        }
                        std::thread::sleep(WAIT_TICK);
                    }
                    Err(e) => {
                        return Err(RunnerError::ExecutionFailed(format!(
                            "Failed to wait for process: {}",
                            e
                        )));
                    }
                }
            }
        } else {
            child.wait().map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let stdout = stdout_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1) as i64;
        let duration_ms = start.elapsed().as_millis() as u64;

        if exit_code == 0 {
            debug!("'{}' completed in {}ms", command.display(), duration_ms);
        } else {
            error!(
                "'{}' failed with exit code {} after {}ms",
                command.display(),
                exit_code,
                duration_ms
            );
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            started_at,
            duration_ms,
        })
    }

    /// Reap a tracked child if it has exited. Returns `Some(alive)` when tracked.
    fn poll_tracked(&self, pid: u32) -> Option<bool> {
        let mut children = self.children.lock();
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                debug!("Process {} exited with {}", pid, status);
                children.remove(&pid);
                Some(false)
            }
            Err(_) => {
                children.remove(&pid);
                Some(false)
            }
        }
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, force: bool) -> RunnerResult<()> {
        signal_group(pid, force)
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: u32, _force: bool) -> RunnerResult<()> {
        if let Some(child) = self.children.lock().get_mut(&pid) {
            let _ = child.kill();
        }
        Ok(())
    }
}

/// Signal the process group led by `pid`, falling back to the bare pid.
/// A process that is already gone counts as signalled.
#[cfg(unix)]
fn signal_group(pid: u32, force: bool) -> RunnerResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let sig = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let target = Pid::from_raw(pid as i32);

    match killpg(target, sig) {
        Ok(()) => return Ok(()),
        Err(Errno::ESRCH) => {}
        Err(e) => debug!("killpg({}, {}) failed: {}", pid, sig, e),
    }
    match kill(target, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(RunnerError::SignalFailed {
            pid,
            message: e.to_string(),
        }),
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> RunnerResult<CommandOutput> {
        let command = command.clone();
        tokio::task::spawn_blocking(move || Self::execute_blocking(&command))
            .await
            .map_err(|e| RunnerError::ExecutionFailed(format!("Command task panicked: {}", e)))?
    }

    async fn spawn(&self, argv: &[String], cwd: &Path, log_file: &Path) -> RunnerResult<u32> {
        let program = argv.first().ok_or(RunnerError::EmptyCommand)?;

        let log = OpenOptions::new().create(true).append(true).open(log_file)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(program);
        cmd.args(&argv[1..]);
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(log));
        cmd.stderr(Stdio::from(log_err));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: program.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();

        info!("Spawned '{}' as pid {} (log: {:?})", argv.join(" "), pid, log_file);
        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    async fn stop(&self, pid: u32, grace: Duration) -> RunnerResult<()> {
        if !self.is_alive(pid).await {
            debug!("Process {} already gone", pid);
            self.children.lock().remove(&pid);
            return Ok(());
        }

        info!("Stopping process {}", pid);
        self.signal(pid, false)?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_alive(pid).await {
                debug!("Process {} terminated gracefully", pid);
                return Ok(());
            }
            tokio::time::sleep(WAIT_TICK).await;
        }

        warn!("Process {} ignored SIGTERM, killing", pid);
        self.signal(pid, true)?;

        if let Some(mut child) = self.children.lock().remove(&pid) {
            let _ = child.wait();
        }
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        if let Some(alive) = self.poll_tracked(pid) {
            return alive;
        }

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }

        #[cfg(not(unix))]
        {
            false
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();

        let ok = runner
            .run(&CommandSpec::new(argv(&["sh", "-c", "echo hello; echo oops >&2"]), dir.path()))
            .await
            .unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");
        assert_eq!(ok.stderr.trim(), "oops");

        let failed = runner
            .run(&CommandSpec::new(argv(&["sh", "-c", "exit 3"]), dir.path()))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, 3);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();

        let result = runner
            .run(&CommandSpec::new(argv(&["sleep", "5"]), dir.path()).timeout(1))
            .await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));
    }

    /// Running and not a zombie, per /proc.
    #[cfg(target_os = "linux")]
    fn process_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_children() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();
        let pid_file = dir.path().join("child.pid");

        let result = runner
            .run(
                &CommandSpec::new(
                    argv(&["sh", "-c", "sleep 30 >/dev/null 2>&1 & echo $! > child.pid; wait"]),
                    dir.path(),
                )
                .timeout(1),
            )
            .await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));

        let child: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let mut gone = false;
        for _ in 0..20 {
            if !process_running(child) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "forked child {} survived the timeout", child);
    }

    #[tokio::test]
    async fn test_run_empty_command() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();

        let result = runner.run(&CommandSpec::new(Vec::new(), dir.path())).await;
        assert!(matches!(result, Err(RunnerError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_spawn_and_stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();
        let log = dir.path().join("server.log");

        let pid = runner
            .spawn(&argv(&["sh", "-c", "echo started; sleep 30"]), dir.path(), &log)
            .await
            .unwrap();
        assert!(runner.is_alive(pid).await);

        runner.stop(pid, Duration::from_secs(2)).await.unwrap();
        assert!(!runner.is_alive(pid).await);

        // Second stop on a gone process is a no-op.
        runner.stop(pid, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let dir = TempDir::new().unwrap();
        let runner = SystemRunner::new();
        let log = dir.path().join("server.log");

        let pid = runner
            .spawn(&argv(&["sh", "-c", "trap '' TERM; sleep 30"]), dir.path(), &log)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        runner.stop(pid, Duration::from_millis(300)).await.unwrap();
        assert!(!runner.is_alive(pid).await);
    }
}

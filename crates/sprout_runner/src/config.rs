//! Build and command configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
            timeout_seconds: 600,
        }
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Program name (first argv element).
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(|s| s.as_str())
    }

    /// Command line joined with spaces, used for log headers.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Configuration for a build-and-serve cycle.
///
/// Defaults match a Next.js workspace served by `npm run dev` on port 3000.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Dependency install command
    pub install: Vec<String>,
    /// Build command
    pub build: Vec<String>,
    /// Long-running server command
    pub serve: Vec<String>,
    /// Build cache directory removed before every build (relative to workspace)
    pub cache_dir: Option<String>,
    /// Server log file (relative to workspace)
    pub log_file: String,
    /// Timeout for install and build commands
    pub command_timeout_seconds: u64,
    /// Endpoint polled by the HTTP health check
    pub health_url: String,
    /// URL reported once the server is healthy
    pub run_url: String,
    /// Overall health-check deadline
    pub health_timeout_ms: u64,
    /// Delay between health-check attempts
    pub poll_interval_ms: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping the server
    pub stop_grace_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install: argv(&["npm", "install"]),
            build: argv(&["npm", "run", "build"]),
            serve: argv(&["npm", "run", "dev"]),
            cache_dir: Some(".next".to_string()),
            log_file: "dev_server.log".to_string(),
            command_timeout_seconds: 600,
            health_url: "http://localhost:3000/api/health".to_string(),
            run_url: "http://localhost:3000".to_string(),
            health_timeout_ms: 30_000,
            poll_interval_ms: 500,
            stop_grace_ms: 2_000,
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(mut self, cmd: &[&str]) -> Self {
        self.install = argv(cmd);
        self
    }

    pub fn build(mut self, cmd: &[&str]) -> Self {
        self.build = argv(cmd);
        self
    }

    pub fn serve(mut self, cmd: &[&str]) -> Self {
        self.serve = argv(cmd);
        self
    }

    pub fn cache_dir(mut self, dir: Option<&str>) -> Self {
        self.cache_dir = dir.map(|d| d.to_string());
        self
    }

    pub fn health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = url.into();
        self
    }

    pub fn run_url(mut self, url: impl Into<String>) -> Self {
        self.run_url = url.into();
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn command_timeout(mut self, seconds: u64) -> Self {
        self.command_timeout_seconds = seconds;
        self
    }

    pub fn health_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace_duration(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Install command bound to a workspace.
    pub fn install_command(&self, workspace: &Path) -> CommandSpec {
        CommandSpec::new(self.install.clone(), workspace).timeout(self.command_timeout_seconds)
    }

    /// Build command bound to a workspace.
    pub fn build_command(&self, workspace: &Path) -> CommandSpec {
        CommandSpec::new(self.build.clone(), workspace).timeout(self.command_timeout_seconds)
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_defaults() {
        let config = BuildConfig::default();

        assert_eq!(config.install, vec!["npm", "install"]);
        assert_eq!(config.build, vec!["npm", "run", "build"]);
        assert_eq!(config.serve, vec!["npm", "run", "dev"]);
        assert_eq!(config.cache_dir.as_deref(), Some(".next"));
        assert_eq!(config.run_url, "http://localhost:3000");
        assert_eq!(config.health_timeout_duration(), Duration::from_secs(30));
        assert_eq!(config.poll_interval_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_build_config_builder() {
        let config = BuildConfig::new()
            .install(&["true"])
            .build(&["make"])
            .cache_dir(None)
            .health_timeout(Duration::from_millis(50))
            .command_timeout(5);

        let cmd = config.build_command(Path::new("/tmp/app"));
        assert_eq!(cmd.argv, vec!["make"]);
        assert_eq!(cmd.cwd, PathBuf::from("/tmp/app"));
        assert_eq!(cmd.timeout_seconds, 5);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.health_timeout_ms, 50);
    }

    #[test]
    fn test_build_config_partial_json_keeps_defaults() {
        let config: BuildConfig = serde_json::from_str(r#"{"run_url": "http://localhost:4000"}"#).unwrap();
        assert_eq!(config.run_url, "http://localhost:4000");
        assert_eq!(config.install, vec!["npm", "install"]);
    }
}

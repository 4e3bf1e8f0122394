//! Pipeline configuration: TOML file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sprout_runner::BuildConfig;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sprout.toml";

pub const ENV_WORK_DIR: &str = "SPROUT_WORK_DIR";
pub const ENV_TEMPLATE_DIR: &str = "SPROUT_TEMPLATE_DIR";
pub const ENV_MAX_RETRIES: &str = "SPROUT_MAX_RETRIES";
pub const ENV_HEALTH_URL: &str = "SPROUT_HEALTH_URL";

/// Settings for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent directory of every run workspace
    pub work_dir: PathBuf,
    /// Base project copied into fresh workspaces
    pub template_dir: PathBuf,
    pub max_retries: u32,
    pub retry_internal_failures: bool,
    pub build: BuildConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            template_dir: PathBuf::from("templates/next-basic"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_internal_failures: true,
            build: BuildConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path` (or [`CONFIG_FILE`] when it exists), then apply
    /// environment overrides. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SPROUT_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_TEMPLATE_DIR) {
            self.template_dir = PathBuf::from(dir);
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = retries.trim().parse().map_err(|_| {
                CoreError::Config(format!("{} must be a number, got {:?}", ENV_MAX_RETRIES, retries))
            })?;
        }
        if let Some(url) = lookup(ENV_HEALTH_URL) {
            self.build.health_url = url;
        }
        Ok(self)
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn build_config(mut self, build: BuildConfig) -> Self {
        self.build = build;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries).retry_internal_failures(self.retry_internal_failures)
    }
}

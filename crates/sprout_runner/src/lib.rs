//! # sprout_runner
//!
//! Build supervision and process control for sprout.
//!
//! This crate runs the external side of a pipeline build: dependency
//! install and build commands, the long-running preview server, and the
//! health predicate that decides whether that server is ready.
//!
//! # Features
//!
//! - **System Runner**: `std::process` execution with timeouts, detached
//!   servers in their own process group, SIGTERM→SIGKILL stop
//! - **Build Supervisor**: install → build → serve → health polling with
//!   short-circuit on failing commands
//! - **Health Checks**: HTTP GET or any closure
//! - **Mock Runner**: scripted responses for testing without npm
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use sprout_runner::{BuildConfig, BuildSupervisor, HttpHealthCheck, SystemRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BuildConfig::default();
//!     let health = HttpHealthCheck::new(config.health_url.clone());
//!     let supervisor = BuildSupervisor::new(Arc::new(SystemRunner::new()), config);
//!
//!     let outcome = supervisor.build(Path::new("work/my-app"), &health).await;
//!     println!("success={} pid={:?}", outcome.success, outcome.process_id);
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod mock;
pub mod runner;
pub mod supervisor;
pub mod system;

pub use config::{BuildConfig, CommandSpec};
pub use error::{RunnerError, RunnerResult};
pub use health::{wait_until_healthy, FnHealthCheck, HealthCheck, HttpHealthCheck};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandOutput, ProcessRunner};
pub use supervisor::{BuildFailure, BuildOutcome, BuildStep, BuildSupervisor};
pub use system::SystemRunner;

//! CLI command definitions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thiserror::Error;

use sprout_core::{PipelineConfig, Run, RunService, TemplateGenerator};
use sprout_runner::{HttpHealthCheck, SystemRunner};

pub mod run;
pub mod shell;

/// sprout - prompt to running preview
#[derive(Parser, Debug)]
#[command(name = "sprout")]
#[command(version, about = "sprout - turn a prompt into a running app preview")]
#[command(long_about = r#"
sprout scaffolds a web app from a prompt, builds it, serves it and keeps
fixing and rebuilding (up to a bounded number of retries) until the preview
answers its health check.

COMMANDS:
  run    → Build once, optionally apply edits and export
  shell  → Interactive session: build, edit, status, export, reset

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Build failed (no preview URL)
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./sprout.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding run workspaces
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Project template copied into new workspaces
    #[arg(long, global = true)]
    pub template_dir: Option<PathBuf>,

    /// Maximum failing builds per run
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an app from a prompt
    Run(run::RunArgs),

    /// Start an interactive session
    Shell,
}

/// A run ended without a healthy preview.
#[derive(Error, Debug)]
#[error("run {slug} finished without a preview URL: {reason}")]
pub struct RunFailed {
    pub slug: String,
    pub reason: String,
}

impl RunFailed {
    pub fn from_run(run: &Run) -> Self {
        Self {
            slug: run.slug.clone(),
            reason: run
                .state
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

/// File, then environment, then command-line flags.
pub fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(dir) = &cli.template_dir {
        config.template_dir = dir.clone();
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }
    Ok(config)
}

/// Service over the real process runner and HTTP health check.
pub fn build_service(cli: &Cli) -> Result<RunService> {
    let config = load_config(cli)?;
    let health = Arc::new(HttpHealthCheck::new(config.build.health_url.clone()));
    Ok(RunService::new(
        config,
        Arc::new(TemplateGenerator::new()),
        Arc::new(SystemRunner::new()),
        health,
    ))
}

/// Print the task log and outcome of a run.
pub fn print_run(run: &Run) {
    println!("Run: {}", run.slug);
    for entry in &run.state.task_log {
        println!("  [{}] {} {}", entry.stage, entry.status, entry.note);
    }
    match (&run.state.run_url, &run.state.last_error) {
        (Some(url), _) => println!("Preview: {}", url),
        (None, Some(error)) => println!("Failed: {}", error),
        (None, None) => println!("Failed: no preview URL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "sprout",
            "--work-dir",
            "/tmp/work",
            "run",
            "--prompt",
            "a todo app",
            "--edit",
            "make the navbar green",
            "--edit",
            "add a footer",
            "--keep",
        ])
        .unwrap();

        assert_eq!(cli.work_dir, Some(PathBuf::from("/tmp/work")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.prompt, "a todo app");
                assert_eq!(args.edit.len(), 2);
                assert!(args.keep);
                assert!(!args.export);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["sprout", "--max-retries", "1", "--template-dir", "tpl", "shell"]).unwrap();

        let config = load_config(&cli).unwrap();

        assert_eq!(config.max_retries, 1);
        assert_eq!(config.template_dir, PathBuf::from("tpl"));
    }

    #[test]
    fn test_run_requires_prompt() {
        assert!(Cli::try_parse_from(["sprout", "run"]).is_err());
    }
}

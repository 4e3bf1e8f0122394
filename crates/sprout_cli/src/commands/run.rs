//! Run command implementation.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use super::{build_service, print_run, Cli, RunFailed};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What to build
    #[arg(short, long)]
    pub prompt: String,

    /// Edit to apply after the build (repeatable, applied in order)
    #[arg(short, long)]
    pub edit: Vec<String>,

    /// Export the workspace as an archive when done
    #[arg(long)]
    pub export: bool,

    /// Keep the workspace and server instead of resetting
    #[arg(long)]
    pub keep: bool,
}

pub async fn execute(cli: &Cli, args: &RunArgs) -> Result<()> {
    let service = build_service(cli)?;

    let mut run = service
        .build(&args.prompt)
        .await
        .context("Failed to build app")?;
    print_run(&run);

    for edit in &args.edit {
        info!("Applying edit to {}: {}", run.slug, edit);
        run = service
            .edit(&run.slug, edit)
            .await
            .with_context(|| format!("Failed to apply edit: {}", edit))?;
        print_run(&run);
    }

    if args.export {
        let archive = service
            .export(&run.slug)
            .await
            .with_context(|| format!("Failed to export {}", run.slug))?;
        println!("Exported: {}", archive.display());
    }

    let failed = run.state.run_url.is_none();

    if args.keep {
        println!("Workspace kept: {}", service.config().work_dir.join(&run.slug).display());
    } else if let Err(e) = service.reset(&run.slug).await {
        warn!("Could not reset {}: {}", run.slug, e);
    }

    if failed {
        return Err(RunFailed::from_run(&run).into());
    }
    Ok(())
}

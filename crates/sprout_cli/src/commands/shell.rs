//! Interactive shell over stdin.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use sprout_core::RunService;
use sprout_workspace::list_files;

use super::{build_service, print_run, Cli};

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Build(String),
    Edit { slug: String, prompt: String },
    Process { slug: Option<String>, prompt: String },
    Status(String),
    List,
    Export(String),
    Reset(String),
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let parsed = match verb {
            "build" => required(rest, "build <prompt>").map(ShellCommand::Build),
            "edit" => match rest.split_once(char::is_whitespace) {
                Some((slug, prompt)) if !prompt.trim().is_empty() => Ok(ShellCommand::Edit {
                    slug: slug.to_string(),
                    prompt: prompt.trim().to_string(),
                }),
                _ => Err("usage: edit <slug> <prompt>".to_string()),
            },
            "process" => process_args(rest),
            "status" => required(rest, "status <slug>").map(ShellCommand::Status),
            "list" => Ok(ShellCommand::List),
            "export" => required(rest, "export <slug>").map(ShellCommand::Export),
            "reset" => required(rest, "reset <slug>").map(ShellCommand::Reset),
            "help" | "?" => Ok(ShellCommand::Help),
            "quit" | "exit" => Ok(ShellCommand::Quit),
            other => Err(format!("unknown command '{}' (try help)", other)),
        };
        Some(parsed)
    }
}

fn required(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("usage: {}", usage))
    } else {
        Ok(rest.to_string())
    }
}

/// `process [@slug] <prompt>`: a leading `@` marks the target slug.
fn process_args(rest: &str) -> Result<ShellCommand, String> {
    if rest.is_empty() {
        return Err("usage: process [@slug] <prompt>".to_string());
    }
    if let Some(tagged) = rest.strip_prefix('@') {
        return match tagged.split_once(char::is_whitespace) {
            Some((slug, prompt)) if !prompt.trim().is_empty() => Ok(ShellCommand::Process {
                slug: Some(slug.to_string()),
                prompt: prompt.trim().to_string(),
            }),
            _ => Err("usage: process [@slug] <prompt>".to_string()),
        };
    }
    Ok(ShellCommand::Process {
        slug: None,
        prompt: rest.to_string(),
    })
}

const HELP: &str = "\
Commands:
  build <prompt>             Build a new app
  edit <slug> <prompt>       Edit an existing app
  process [@slug] <prompt>   Build or edit depending on the request
  status <slug>              Show a run's state
  list                       List runs
  export <slug>              Archive a run's workspace
  reset <slug>               Stop and delete a run
  quit                       Stop all servers and exit";

pub async fn execute(cli: &Cli) -> Result<()> {
    let service = build_service(cli)?;
    println!("sprout shell (type 'help' for commands)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ShellCommand::parse(&line) {
            None => continue,
            Some(Err(usage)) => {
                println!("{}", usage);
                continue;
            }
            Some(Ok(command)) => command,
        };
        debug!("Shell command: {:?}", command);

        if command == ShellCommand::Quit {
            break;
        }
        if let Err(e) = dispatch(&service, command).await {
            println!("Error: {}", e);
        }
    }

    service.stop_all().await;
    Ok(())
}

async fn dispatch(service: &RunService, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Build(prompt) => print_run(&service.build(&prompt).await?),
        ShellCommand::Edit { slug, prompt } => print_run(&service.edit(&slug, &prompt).await?),
        ShellCommand::Process { slug, prompt } => {
            print_run(&service.process(&prompt, slug.as_deref()).await?)
        }
        ShellCommand::Status(slug) => {
            let run = service.registry().get_required(&slug).await?;
            let mut summary = serde_json::to_value(&run.state)?;
            if let Some(repo) = &run.state.repo_path {
                summary["files"] = serde_json::json!(list_files(repo));
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ShellCommand::List => {
            let slugs = service.registry().slugs().await;
            if slugs.is_empty() {
                println!("No runs.");
            }
            for slug in slugs {
                if let Some(run) = service.registry().get(&slug).await {
                    let url = run.state.run_url.as_deref().unwrap_or("-");
                    println!("  {}  {}  {}", run.slug, url, run.initial_prompt);
                }
            }
        }
        ShellCommand::Export(slug) => {
            let archive = service.export(&slug).await?;
            println!("Exported: {}", archive.display());
        }
        ShellCommand::Reset(slug) => {
            service.reset(&slug).await?;
            println!("Reset {}", slug);
        }
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => {}
    }
    Ok(())
}

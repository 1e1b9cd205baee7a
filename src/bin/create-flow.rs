//! `create-flow` — the CLI surface spec'd as a reference companion to the
//! orchestration core (spec §6 "CLI surface (reference)"): scaffolds a new
//! flow source file from an internal template.
//!
//! Grounded on the teacher's `clap::Parser`-derived subcommand style (see
//! `knhk-workflow` in the example pack) even though the teacher itself has
//! no scaffold command; the template-render-then-write shape is this
//! binary's own, since it is reference tooling around the core rather than
//! part of it.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

const FLOW_TEMPLATE: &str = r#"//! {name} flow.
{description_comment}
use crew_runtime::crew::{{Crew, CrewConfig}};
use crew_runtime::model::{{Agent, Task}};

pub fn build() -> (Vec<Agent>, Vec<Task>) {{
    let agents = vec![Agent::new("agent", "Role", "Goal", "llm-ref")];
    let tasks = vec![Task::new("task-1", "Describe the first step of {name}", "agent")];
    (agents, tasks)
}}
"#;

#[derive(Parser)]
#[command(name = "create-flow")]
#[command(about = "Scaffold a new orchestration flow from the internal template")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a new flow scaffold file
    CreateFlow {
        /// Name of the flow; also used as the scaffold's identifier
        name: String,
        /// Short human-readable description embedded as a doc comment
        #[arg(long)]
        description: Option<String>,
        /// Directory the scaffold file is written into (created if absent)
        #[arg(long, default_value = ".")]
        directory: PathBuf,
    },
}

fn main() -> ExitCode {
    crew_runtime::telemetry::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::CreateFlow { name, description, directory } => {
            match scaffold_flow(&name, description.as_deref(), &directory) {
                Ok(path) => {
                    println!("created {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("create-flow: {err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn scaffold_flow(name: &str, description: Option<&str>, directory: &std::path::Path) -> std::io::Result<PathBuf> {
    if name.trim().is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "flow name must not be empty"));
    }
    let file_name = format!("{}.rs", snake_case(name));
    let path = directory.join(&file_name);
    if path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }
    std::fs::create_dir_all(directory)?;
    let description_comment = description.map(|d| format!("//!\n//! {d}\n")).unwrap_or_default();
    let rendered = FLOW_TEMPLATE
        .replace("{name}", name)
        .replace("{description_comment}", &description_comment);
    std::fs::write(&path, rendered)?;
    Ok(path)
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{inspect, manifest_cmd, resolve_cmd, state_cmd};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "stack")]
#[command(author, version, about = "Resolve references and application order for a declared infrastructure stack")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config's default_format)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Manifest to use instead of the project's configured one
    #[arg(long, global = true, env = "STACK_MANIFEST")]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stack project with a sample manifest
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Check the manifest against resource schemas and ordering rules
    Validate,

    /// Show the application order
    Order,

    /// Show dependencies and dependents
    Graph {
        /// Only show this node
        node: Option<String>,
    },

    /// Resolve without applying; unknown values stay as ${node.attr} tokens
    Plan,

    /// Resolve with the simulated engine and record state
    Apply,

    /// Show exported values from the last apply
    Outputs,

    /// Print the manifest in another format
    Fmt {
        /// Target format
        #[arg(long, value_enum, default_value = "toml")]
        to: manifest_cmd::Syntax,
    },

    /// Inspect or discard recorded state
    #[command(subcommand)]
    State(state_cmd::StateCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = match cli.format {
        Some(format) => format,
        None => Config::load()?.global.default_format.into(),
    };
    let output = Output::new(format, cli.verbose);
    let file = cli.file.as_deref();

    output.verbose("stack starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing project at: {}", path));
            let project = Project::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created .stack directory at: {}", project.stack_dir().display()),
            );
            output.success(&format!("Initialized stack project at {}", project.root().display()));
        }

        Commands::Validate => inspect::validate(&output, file)?,
        Commands::Order => inspect::order(&output, file)?,
        Commands::Graph { node } => inspect::graph(&output, file, node.as_deref())?,

        Commands::Plan => resolve_cmd::plan(&output, file)?,
        Commands::Apply => resolve_cmd::apply(&output, file)?,
        Commands::Outputs => resolve_cmd::outputs(&output)?,

        Commands::Fmt { to } => manifest_cmd::fmt(&output, file, to)?,
        Commands::State(cmd) => state_cmd::run(cmd, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}

//! State management commands

use anyhow::{bail, Result};
use clap::Subcommand;

use super::output::Output;
use crate::domain::NodeId;
use crate::storage::Project;

#[derive(Subcommand)]
pub enum StateCommands {
    /// Show recorded resources, or every recorded attribute of one resource
    Show {
        /// Resource to show in detail
        node: Option<String>,
    },

    /// Discard recorded state
    Clear,
}

pub fn run(cmd: StateCommands, output: &Output) -> Result<()> {
    match cmd {
        StateCommands::Show { node } => match node {
            Some(raw) => show_resource(output, &raw),
            None => show(output),
        },
        StateCommands::Clear => clear(output),
    }
}

fn show(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.state_store();
    output.verbose_ctx("state", &format!("Reading {}", store.path().display()));

    if output.is_json() {
        output.data(&store.read_entries()?);
        return Ok(());
    }

    let state = store.read()?;
    if state.is_empty() {
        println!("No state recorded. Run 'stack apply' first.");
        return Ok(());
    }

    println!("{:<36} {:<40} APPLIED AT", "ID", "KIND");
    println!("{}", "-".repeat(100));
    for resource in &state.resources {
        println!(
            "{:<36} {:<40} {}",
            resource.id,
            resource.kind,
            resource.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}

fn show_resource(output: &Output, raw: &str) -> Result<()> {
    let id: NodeId = raw.parse()?;
    let project = Project::open_current()?;
    let state = project.state_store().read()?;

    let Some(resource) = state.resource(&id) else {
        bail!("No recorded state for '{}'", id);
    };

    if output.is_json() {
        output.data(resource);
        return Ok(());
    }

    println!("{} ({})", resource.id, resource.kind);
    println!("  applied at: {}", resource.applied_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (name, value) in resource.attributes.iter().chain(resource.computed.iter()) {
        println!("  {} = {}", name, value);
    }

    Ok(())
}

fn clear(output: &Output) -> Result<()> {
    let project = Project::open_current()?;

    if project.state_store().clear()? {
        output.success("Cleared recorded state");
    } else {
        output.success("No state to clear");
    }

    Ok(())
}

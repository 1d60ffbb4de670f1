//! Resolution commands (plan, apply, outputs)

use std::path::Path;

use anyhow::{Context, Result};

use super::inspect::{check_schemas, open_stack};
use super::output::Output;
use crate::domain::{interpolate, Resolution, ResolveMode};
use crate::engine::PlanEngine;
use crate::storage::Project;

/// Resolve without applying
pub fn plan(output: &Output, file: Option<&Path>) -> Result<()> {
    let (_, stack) = open_stack(output, "plan", file)?;
    check_schemas(output, &stack)?;

    let resolution = stack.resolve(&mut PlanEngine, ResolveMode::Plan)?;
    output.verbose_ctx(
        "plan",
        &format!("Resolved {} nodes, complete: {}", resolution.nodes.len(), resolution.is_complete()),
    );

    if output.is_json() {
        output.data(&summary(stack.name(), &resolution));
    } else {
        println!("Plan for '{}': {} to create", stack.name(), resolution.nodes.len());
        print_resolution(&resolution);
    }

    Ok(())
}

/// Resolve with the simulated engine and record the result
pub fn apply(output: &Output, file: Option<&Path>) -> Result<()> {
    let (project, stack) = open_stack(output, "apply", file)?;
    check_schemas(output, &stack)?;

    let mut engine = project.engine();
    output.verbose_ctx(
        "apply",
        &format!("Using simulated engine in region {}", project.config().effective_region()),
    );

    let resolution = stack.resolve(&mut engine, ResolveMode::Apply)?;

    let store = project.state_store();
    store.record(&resolution).context("Failed to record applied state")?;
    output.verbose_ctx("apply", &format!("Recorded state in {}", store.path().display()));

    if output.is_json() {
        output.data(&summary(stack.name(), &resolution));
    } else {
        println!("Applied '{}': {} resources", stack.name(), resolution.nodes.len());
        print_resolution(&resolution);
    }

    Ok(())
}

/// Show exported values from recorded state
pub fn outputs(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let state = project.state_store().read()?;
    output.verbose_ctx(
        "outputs",
        &format!("Read {} resources, {} outputs", state.resources.len(), state.outputs.len()),
    );

    if output.is_json() {
        output.data(&state.outputs);
    } else if state.outputs.is_empty() {
        println!("No outputs recorded. Run 'stack apply' first.");
    } else {
        for (name, value) in &state.outputs {
            println!("{} = {}", name, interpolate(value));
        }
    }

    Ok(())
}

fn summary(stack: &str, resolution: &Resolution) -> serde_json::Value {
    serde_json::json!({
        "stack": stack,
        "order": resolution.order,
        "resources": resolution.nodes,
        "outputs": resolution.outputs,
        "complete": resolution.is_complete(),
    })
}

fn print_resolution(resolution: &Resolution) {
    for node in &resolution.nodes {
        println!();
        println!("+ {} ({})", node.id, node.kind);
        for (name, value) in &node.attributes {
            println!("    {} = {}", name, value);
        }
        for (name, value) in &node.computed {
            println!("    {} = {}  (computed)", name, value);
        }
    }

    if !resolution.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for (name, value) in &resolution.outputs {
            println!("    {} = {}", name, value);
        }
    }
}

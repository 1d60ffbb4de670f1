//! Read-only stack commands (validate, order, graph)

use std::path::Path;

use anyhow::{bail, Result};

use super::output::Output;
use crate::domain::{NodeId, SchemaRegistry, Stack};
use crate::storage::Project;

/// Opens the current project and loads the stack it declares
pub(super) fn open_stack(output: &Output, context: &str, file: Option<&Path>) -> Result<(Project, Stack)> {
    let project = Project::open_current()?;
    output.verbose_ctx(
        context,
        &format!("Opened project at: {}", project.root().display()),
    );

    let stack = project.load_stack(file)?;
    output.verbose_ctx(
        context,
        &format!("Loaded stack '{}' with {} resources", stack.name(), stack.len()),
    );

    Ok((project, stack))
}

/// Fails with every schema error found, printing each one
pub(super) fn check_schemas(output: &Output, stack: &Stack) -> Result<()> {
    let errors = stack.validate(&SchemaRegistry::aws_bucket());
    if errors.is_empty() {
        return Ok(());
    }

    for error in &errors {
        output.error(&error.to_string());
    }
    bail!("{} schema error(s) in stack '{}'", errors.len(), stack.name());
}

/// Validate the manifest
pub fn validate(output: &Output, file: Option<&Path>) -> Result<()> {
    let (_, stack) = open_stack(output, "validate", file)?;

    check_schemas(output, &stack)?;
    let order = stack.order()?;
    output.verbose_ctx("validate", &format!("Ordered {} resources", order.len()));

    if output.is_json() {
        output.data(&serde_json::json!({
            "valid": true,
            "stack": stack.name(),
            "resources": stack.len(),
            "outputs": stack.exports().len(),
        }));
    } else {
        output.success(&format!(
            "Stack '{}' is valid ({} resources, {} outputs)",
            stack.name(),
            stack.len(),
            stack.exports().len()
        ));
    }

    Ok(())
}

/// Show the application order
pub fn order(output: &Output, file: Option<&Path>) -> Result<()> {
    let (_, stack) = open_stack(output, "order", file)?;
    let order = stack.order()?;

    if output.is_json() {
        output.data(&order);
    } else {
        println!("Application order for '{}':", stack.name());
        for (position, id) in order.iter().enumerate() {
            let kind = stack.get(id).map(|n| n.kind.as_str()).unwrap_or_default();
            println!("{:>3}. {:<36} {}", position + 1, id, kind);
        }
    }

    Ok(())
}

/// Show dependencies and dependents
pub fn graph(output: &Output, file: Option<&Path>, node: Option<&str>) -> Result<()> {
    let (_, stack) = open_stack(output, "graph", file)?;
    let graph = stack.graph()?;
    output.verbose_ctx(
        "graph",
        &format!("{} nodes, {} edges", graph.len(), graph.edge_count()),
    );

    let ids: Vec<NodeId> = match node {
        Some(raw) => {
            let id: NodeId = raw.parse()?;
            if !graph.contains(&id) {
                bail!("Unknown node: {}", id);
            }
            vec![id]
        }
        None => graph.node_ids().cloned().collect(),
    };

    if output.is_json() {
        let items: Vec<_> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "depends_on": graph.dependencies(id),
                    "dependents": graph.dependents(id),
                })
            })
            .collect();
        output.data(&items);
    } else {
        println!("{:<36} {:<48} DEPENDENTS", "NODE", "DEPENDS ON");
        println!("{}", "-".repeat(110));
        for id in &ids {
            println!(
                "{:<36} {:<48} {}",
                id,
                join(&graph.dependencies(id)),
                join(&graph.dependents(id))
            );
        }
    }

    Ok(())
}

fn join(ids: &[NodeId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

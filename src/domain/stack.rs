//! Stack builder
//!
//! A [`Stack`] accumulates declared nodes and exported outputs. It is passed
//! around explicitly by the caller; nothing registers itself globally.

use std::collections::{BTreeMap, HashSet};

use super::graph::{resolve, ReferenceGraph, ResolveError};
use super::id::{AttributeRef, IdError, NodeId};
use super::node::{ResourceNode, Value};
use super::resolve::{resolve_with, ApplyEngine, Resolution, ResolveMode};
use super::schema::{validate, SchemaError, SchemaProvider};

/// Handle to a declared node, used to build references to its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    id: NodeId,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns a deferred reference to one of the node's attributes
    pub fn attr(&self, attribute: &str) -> Result<Value, IdError> {
        Ok(Value::Deferred(self.reference(attribute)?))
    }

    pub fn reference(&self, attribute: &str) -> Result<AttributeRef, IdError> {
        self.id.attr(attribute)
    }
}

/// A named collection of resource declarations and exported outputs
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    nodes: Vec<ResourceNode>,
    ids: HashSet<NodeId>,
    exports: BTreeMap<String, Value>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a stack from already declared nodes, in declaration order
    pub fn from_parts(
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = ResourceNode>,
        exports: BTreeMap<String, Value>,
    ) -> Result<Self, ResolveError> {
        let mut stack = Self::new(name);
        for node in nodes {
            stack.add(node)?;
        }
        stack.exports = exports;
        Ok(stack)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a node, rejecting duplicate identifiers
    pub fn add(&mut self, node: ResourceNode) -> Result<NodeHandle, ResolveError> {
        if !self.ids.insert(node.id.clone()) {
            return Err(ResolveError::DuplicateIdentifier(node.id));
        }
        let handle = NodeHandle {
            id: node.id.clone(),
        };
        self.nodes.push(node);
        Ok(handle)
    }

    /// Designates an exported output
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.exports.insert(name.into(), value.into());
    }

    pub fn exports(&self) -> &BTreeMap<String, Value> {
        &self.exports
    }

    pub fn get(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks every node against its schema
    pub fn validate(&self, schemas: &dyn SchemaProvider) -> Vec<SchemaError> {
        validate(&self.nodes, schemas)
    }

    /// Returns the application order, also checking that exports point at declared nodes
    pub fn order(&self) -> Result<Vec<NodeId>, ResolveError> {
        let order = resolve(&self.nodes)?;
        self.check_exports()?;
        Ok(order)
    }

    /// Builds the dependency graph for queries
    pub fn graph(&self) -> Result<ReferenceGraph, ResolveError> {
        ReferenceGraph::build(&self.nodes)
    }

    /// Runs the full resolution pass
    pub fn resolve(&self, engine: &mut dyn ApplyEngine, mode: ResolveMode) -> Result<Resolution, ResolveError> {
        self.check_exports()?;
        resolve_with(&self.nodes, &self.exports, engine, mode)
    }

    fn check_exports(&self) -> Result<(), ResolveError> {
        for (name, value) in &self.exports {
            if let Some(reference) = value.references().into_iter().find(|r| !self.ids.contains(&r.node)) {
                return Err(ResolveError::UnresolvedExport {
                    export: name.clone(),
                    reference: reference.clone(),
                });
            }
        }
        Ok(())
    }
}

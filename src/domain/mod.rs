//! Domain models for stack resolution
//!
//! Contains the resolver core without any I/O concerns.

mod id;
mod node;
mod graph;
mod resolve;
mod schema;
mod stack;

pub use id::{AttributeRef, IdError, NodeId};
pub use node::{interpolate, Attributes, Fragment, NodeState, ResourceNode, Value};
pub use graph::{resolve, ReferenceGraph, ResolveError};
pub use resolve::{
    resolve_with, ApplyEngine, ApplyError, ComputedAttributes, Resolution, ResolveMode, ResolvedNode,
    Unresolved,
};
pub use schema::{
    validate, ArgumentSchema, AttrType, Computed, ResourceSchema, SchemaError, SchemaProvider,
    SchemaRegistry,
};
pub use stack::{NodeHandle, Stack};

//! stack-resolver - Reference graph resolution for declared infrastructure stacks
//!
//! A stack is a set of resource nodes whose attributes may reference other
//! nodes' attributes. The resolver orders nodes so each comes after everything
//! it references, then substitutes referenced values (or deferred
//! `${node.attr}` tokens) along that order.

pub mod domain;
pub mod engine;
pub mod storage;
pub mod cli;

pub use domain::{resolve, NodeId, ResolveError, ResourceNode, Stack, Value};

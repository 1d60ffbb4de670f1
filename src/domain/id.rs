//! Identifiers for resource nodes and their attributes
//!
//! ID Format:
//! - Node IDs: a letter or `_`, then letters, digits, `_` or `-` (e.g., `site_bucket`)
//! - Attribute names: a letter or `_`, then letters, digits or `_` (e.g., `arn`)
//! - Attribute references: `{node-id}.{attribute}` (e.g., `site_bucket.arn`)
//!
//! References render as `${node.attr}` tokens while their value is still unknown.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid node ID: expected a letter or '_' followed by letters, digits, '_' or '-', got '{0}'")]
    InvalidNodeId(String),

    #[error("Invalid attribute name: '{0}'")]
    InvalidAttribute(String),

    #[error("Invalid attribute reference: expected '{{node-id}}.{{attribute}}', got '{0}'")]
    InvalidReference(String),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Identifier of a resource node, unique within a stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID, validating its format
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        let mut chars = id.chars();
        let valid = chars.next().is_some_and(is_ident_start)
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(id))
        } else {
            Err(IdError::InvalidNodeId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a reference to one of this node's attributes
    pub fn attr(&self, attribute: &str) -> Result<AttributeRef, IdError> {
        AttributeRef::new(self.clone(), attribute)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for NodeId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Validates an attribute name
pub fn validate_attribute(name: &str) -> Result<(), IdError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_ident_start)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(IdError::InvalidAttribute(name.to_string()))
    }
}

/// A reference to another node's attribute: `(target node, attribute name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeRef {
    pub node: NodeId,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(node: NodeId, attribute: impl Into<String>) -> Result<Self, IdError> {
        let attribute = attribute.into();
        validate_attribute(&attribute)?;
        Ok(Self { node, attribute })
    }

    /// Returns the symbolic placeholder used while the value is unknown
    pub fn token(&self) -> String {
        format!("${{{}}}", self)
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

impl FromStr for AttributeRef {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (node, attribute) = s
            .rsplit_once('.')
            .ok_or_else(|| IdError::InvalidReference(s.to_string()))?;

        let node = NodeId::new(node).map_err(|_| IdError::InvalidReference(s.to_string()))?;
        Self::new(node, attribute).map_err(|_| IdError::InvalidReference(s.to_string()))
    }
}

impl TryFrom<String> for AttributeRef {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AttributeRef> for String {
    fn from(r: AttributeRef) -> Self {
        r.to_string()
    }
}

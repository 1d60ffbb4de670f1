//! Resource node domain model
//!
//! A node is a declared unit of infrastructure configuration. Its attributes are
//! either literal values or references to other nodes' (possibly computed)
//! attributes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::id::{validate_attribute, AttributeRef, IdError, NodeId};

/// Attribute name to value mapping, ordered by name
pub type Attributes = BTreeMap<String, Value>;

/// Lifecycle of a node within a single resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Declared,
    Ordered,
    Resolved,
}

impl NodeState {
    /// Returns the only state this one may move to
    pub fn next(self) -> Option<NodeState> {
        match self {
            NodeState::Declared => Some(NodeState::Ordered),
            NodeState::Ordered => Some(NodeState::Resolved),
            NodeState::Resolved => None,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Declared => "declared",
            NodeState::Ordered => "ordered",
            NodeState::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// A piece of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Ref(AttributeRef),
}

/// An attribute value, known now or deferred until the referenced node applies
///
/// `List` and `Map` only appear when they contain at least one reference;
/// fully known structures are always collapsed into `Literal`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Json),
    Deferred(AttributeRef),
    Template(Vec<Fragment>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Literal(Json::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Value::Literal(Json::Bool(b))
    }

    /// Builds a list, collapsing to a literal when every item is known
    pub fn list(items: Vec<Value>) -> Self {
        if items.iter().all(Value::is_known) {
            Value::Literal(Json::Array(items.into_iter().filter_map(Value::into_json).collect()))
        } else {
            Value::List(items)
        }
    }

    /// Builds a map, collapsing to a literal when every entry is known
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        if entries.values().all(Value::is_known) {
            Value::Literal(Json::Object(
                entries
                    .into_iter()
                    .filter_map(|(k, v)| v.into_json().map(|j| (k, j)))
                    .collect(),
            ))
        } else {
            Value::Map(entries)
        }
    }

    /// Builds a template, collapsing to a reference or plain string where possible
    pub fn template(fragments: Vec<Fragment>) -> Self {
        let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            match fragment {
                Fragment::Text(t) if t.is_empty() => {}
                Fragment::Text(t) => match merged.last_mut() {
                    Some(Fragment::Text(prev)) => prev.push_str(&t),
                    _ => merged.push(Fragment::Text(t)),
                },
                f => merged.push(f),
            }
        }

        match merged.as_slice() {
            [] => Value::string(""),
            [Fragment::Text(t)] => Value::string(t.clone()),
            [Fragment::Ref(r)] => Value::Deferred(r.clone()),
            _ => Value::Template(merged),
        }
    }

    /// Parses a string using the `${node.attr}` reference syntax
    ///
    /// A run of `$` directly before `{` is read in pairs: each `$$` is one
    /// literal `$`, and an odd `$` left over opens a reference. So `$${` is a
    /// literal `${` and `$$${a.b}` is a `$` followed by a reference. Runs of
    /// `$` anywhere else are literal text.
    pub fn parse_str(s: &str) -> Result<Self, IdError> {
        let mut fragments = Vec::new();
        let mut text = String::new();
        let mut rest = s;

        while let Some(pos) = rest.find('$') {
            text.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            let run = tail.len() - tail.trim_start_matches('$').len();
            let after_run = &tail[run..];

            let Some(after) = after_run.strip_prefix('{') else {
                text.push_str(&tail[..run]);
                rest = after_run;
                continue;
            };

            text.push_str(&"$".repeat(run / 2));
            if run % 2 == 0 {
                text.push('{');
                rest = after;
                continue;
            }

            let end = after
                .find('}')
                .ok_or_else(|| IdError::InvalidReference(tail[run - 1..].to_string()))?;
            let reference: AttributeRef = after[..end].parse()?;
            fragments.push(Fragment::Text(std::mem::take(&mut text)));
            fragments.push(Fragment::Ref(reference));
            rest = &after[end + 1..];
        }
        text.push_str(rest);
        fragments.push(Fragment::Text(text));

        Ok(Value::template(fragments))
    }

    /// Converts a file-boundary JSON value, recognizing reference strings
    pub fn from_json(json: Json) -> Result<Self, IdError> {
        match json {
            Json::String(s) => Self::parse_str(&s),
            Json::Array(items) => Ok(Self::list(
                items.into_iter().map(Self::from_json).collect::<Result<_, _>>()?,
            )),
            Json::Object(entries) => Ok(Self::map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, Self::from_json(v)?)))
                    .collect::<Result<_, IdError>>()?,
            )),
            other => Ok(Value::Literal(other)),
        }
    }

    /// Converts back to the file-boundary representation
    ///
    /// Unknown references become `${node.attr}` tokens. Literal text is escaped
    /// so that [`Value::from_json`] reads it back unchanged.
    pub fn to_boundary_json(&self) -> Json {
        match self {
            Value::Literal(json) => escape_literal(json),
            Value::Deferred(r) => Json::String(r.token()),
            Value::Template(fragments) => Json::String(render_fragments(fragments)),
            Value::List(items) => Json::Array(items.iter().map(Value::to_boundary_json).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_boundary_json()))
                    .collect(),
            ),
        }
    }

    /// Returns true if the value contains no references
    pub fn is_known(&self) -> bool {
        matches!(self, Value::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Json> {
        match self {
            Value::Literal(json) => Some(json),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Json> {
        match self {
            Value::Literal(json) => Some(json),
            _ => None,
        }
    }

    /// Collects every reference in this value, in traversal order
    pub fn references(&self) -> Vec<&AttributeRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttributeRef>) {
        match self {
            Value::Literal(_) => {}
            Value::Deferred(r) => out.push(r),
            Value::Template(fragments) => {
                for fragment in fragments {
                    if let Fragment::Ref(r) = fragment {
                        out.push(r);
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
        }
    }
}

fn escape_literal(json: &Json) -> Json {
    match json {
        Json::String(s) => Json::String(render_fragments(&[Fragment::Text(s.clone())])),
        Json::Array(items) => Json::Array(items.iter().map(escape_literal).collect()),
        Json::Object(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), escape_literal(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Joins fragments back into `${node.attr}` syntax
///
/// A literal run of `$` is doubled when a `{` or a reference follows it.
fn render_fragments(fragments: &[Fragment]) -> String {
    let mut stream: Vec<(char, bool)> = Vec::new();
    for fragment in fragments {
        match fragment {
            Fragment::Text(t) => stream.extend(t.chars().map(|c| (c, true))),
            Fragment::Ref(r) => stream.extend(r.token().chars().map(|c| (c, false))),
        }
    }

    let mut out = String::with_capacity(stream.len());
    let mut i = 0;
    while i < stream.len() {
        let (c, literal) = stream[i];
        if !(literal && c == '$') {
            out.push(c);
            i += 1;
            continue;
        }

        let run = stream[i..]
            .iter()
            .take_while(|&&(c, literal)| literal && c == '$')
            .count();
        let doubled = match stream.get(i + run) {
            Some(&(next, literal)) => !literal || next == '{',
            None => false,
        };
        out.push_str(&"$".repeat(if doubled { run * 2 } else { run }));
        i += run;
    }
    out
}

/// Renders a known value for embedding inside an interpolated string
pub fn interpolate(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(Json::String(s)) => write!(f, "{:?}", s),
            Value::Deferred(r) => f.write_str(&r.token()),
            Value::Template(fragments) => write!(f, "{:?}", render_fragments(fragments)),
            other => f.write_str(&other.to_boundary_json().to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_boundary_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = Json::deserialize(deserializer)?;
        Value::from_json(json).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<AttributeRef> for Value {
    fn from(r: AttributeRef) -> Self {
        Value::Deferred(r)
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: String,

    #[serde(default)]
    pub attributes: Attributes,

    /// Nodes that must apply first regardless of attribute references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<NodeId>,
}

impl ResourceNode {
    pub fn new(id: NodeId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            attributes: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    /// Sets an attribute
    pub fn with_attr(mut self, name: &str, value: impl Into<Value>) -> Result<Self, IdError> {
        validate_attribute(name)?;
        self.attributes.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Adds an explicit ordering dependency; repeats collapse in [`ResourceNode::dependency_ids`]
    pub fn with_dependency(mut self, node: NodeId) -> Self {
        self.depends_on.push(node);
        self
    }

    /// Returns every attribute reference, in attribute-name order
    pub fn references(&self) -> Vec<&AttributeRef> {
        self.attributes.values().flat_map(Value::references).collect()
    }

    /// Returns the nodes this one depends on, deduplicated
    ///
    /// Referenced nodes come first (attribute-name order), then explicit dependencies.
    pub fn dependency_ids(&self) -> Vec<&NodeId> {
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let referenced = self.references().into_iter().map(|r| &r.node);
        referenced
            .chain(self.depends_on.iter())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Returns true if no attribute holds a reference
    pub fn is_resolved(&self) -> bool {
        self.attributes.values().all(Value::is_known)
    }
}

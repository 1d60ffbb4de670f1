//! Reference resolution pass
//!
//! Walks the application order, substitutes every reference whose target has
//! already been applied, hands the node to an [`ApplyEngine`], and records the
//! attributes it computed for later nodes to consume.

use serde::Serialize;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use super::graph::{resolve, ResolveError};
use super::id::{AttributeRef, NodeId};
use super::node::{interpolate, Attributes, Fragment, NodeState, ResourceNode, Value};

/// Attributes an engine computed while applying a node
pub type ComputedAttributes = BTreeMap<String, Json>;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ApplyError(pub String);

/// Performs (or simulates) creation of a resource
pub trait ApplyEngine {
    /// Applies a node whose references have been substituted
    fn apply(&mut self, node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError>;
}

/// How references to not-yet-known attributes are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Every reference must resolve to a concrete value
    #[default]
    Apply,
    /// Unknown attributes stay deferred and render as `${node.attr}` tokens
    Plan,
}

/// A node after the resolution pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNode {
    pub id: NodeId,
    pub kind: String,
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub computed: ComputedAttributes,
    pub state: NodeState,
}

impl ResolvedNode {
    /// Looks up an attribute, computed values first
    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.computed
            .get(attribute)
            .map(|json| Value::Literal(json.clone()))
            .or_else(|| self.attributes.get(attribute).cloned())
    }

    /// Returns true if every input attribute is known
    pub fn is_resolved(&self) -> bool {
        self.attributes.values().all(Value::is_known)
    }
}

/// Outcome of a full resolution pass
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub order: Vec<NodeId>,
    pub nodes: Vec<ResolvedNode>,
    pub outputs: BTreeMap<String, Value>,
    index: HashMap<NodeId, usize>,
}

impl Resolution {
    pub fn get(&self, id: &NodeId) -> Option<&ResolvedNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Returns true if no attribute or output is still deferred
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(ResolvedNode::is_resolved) && self.outputs.values().all(Value::is_known)
    }

    /// Re-runs substitution over an attribute set using the recorded values
    pub fn substitute(&self, attributes: &Attributes, mode: ResolveMode) -> Result<Attributes, Unresolved> {
        substitute_all(attributes, &|r| self.lookup(r), mode)
    }

    fn lookup(&self, reference: &AttributeRef) -> Lookup {
        match self.get(&reference.node) {
            Some(node) => node.get(&reference.attribute).map_or(Lookup::Absent, Lookup::Found),
            None => Lookup::NotApplied,
        }
    }
}

/// Why a reference could not be substituted
#[derive(Debug, Clone, PartialEq)]
pub enum Unresolved {
    NotApplied(AttributeRef),
    Absent(AttributeRef),
}

enum Lookup {
    Found(Value),
    Absent,
    NotApplied,
}

/// Orders the nodes, then resolves and applies each one in turn
///
/// `exports` are substituted after every node has been applied.
pub fn resolve_with(
    nodes: &[ResourceNode],
    exports: &BTreeMap<String, Value>,
    engine: &mut dyn ApplyEngine,
    mode: ResolveMode,
) -> Result<Resolution, ResolveError> {
    let order = resolve(nodes)?;

    let by_id: HashMap<&NodeId, &ResourceNode> = nodes.iter().map(|n| (&n.id, n)).collect();
    let mut states: HashMap<&NodeId, NodeState> = nodes
        .iter()
        .map(|n| (&n.id, NodeState::Declared))
        .collect();
    for id in &order {
        advance(&mut states, id, NodeState::Ordered);
    }

    let mut resolved: Vec<ResolvedNode> = Vec::with_capacity(order.len());
    let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());

    for id in &order {
        let node = by_id[id];

        let lookup = |r: &AttributeRef| match index.get(&r.node) {
            Some(&i) => resolved[i]
                .get(&r.attribute)
                .map_or(Lookup::Absent, Lookup::Found),
            None => Lookup::NotApplied,
        };

        let attributes = substitute_all(&node.attributes, &lookup, mode).map_err(|e| match e {
            Unresolved::NotApplied(r) => ResolveError::OrderViolation {
                node: id.clone(),
                target: r.node,
            },
            Unresolved::Absent(r) => ResolveError::MissingAttribute {
                node: id.clone(),
                reference: r,
            },
        })?;

        let mut entry = ResolvedNode {
            id: id.clone(),
            kind: node.kind.clone(),
            attributes,
            computed: ComputedAttributes::new(),
            state: NodeState::Ordered,
        };

        entry.computed = engine.apply(&entry).map_err(|e| ResolveError::ApplyFailed {
            node: id.clone(),
            message: e.0,
        })?;
        entry.state = advance(&mut states, id, NodeState::Resolved);

        index.insert(id.clone(), resolved.len());
        resolved.push(entry);
    }

    let mut resolution = Resolution {
        order,
        nodes: resolved,
        outputs: BTreeMap::new(),
        index,
    };

    let outputs = resolution
        .substitute(exports, mode)
        .map_err(|e| {
            let reference = match e {
                Unresolved::NotApplied(r) | Unresolved::Absent(r) => r,
            };
            let export = exports
                .iter()
                .find(|(_, v)| v.references().contains(&&reference))
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            ResolveError::UnresolvedExport { export, reference }
        })?;
    resolution.outputs = outputs;

    Ok(resolution)
}

/// Moves a node to its next state; the order of calls guarantees no skips
fn advance(states: &mut HashMap<&NodeId, NodeState>, id: &NodeId, to: NodeState) -> NodeState {
    if let Some(state) = states.get_mut(id) {
        debug_assert_eq!(state.next(), Some(to), "node {} cannot move from {} to {}", id, state, to);
        *state = to;
    }
    to
}

fn substitute_all(
    attributes: &Attributes,
    lookup: &dyn Fn(&AttributeRef) -> Lookup,
    mode: ResolveMode,
) -> Result<Attributes, Unresolved> {
    attributes
        .iter()
        .map(|(name, value)| Ok((name.clone(), substitute(value, lookup, mode)?)))
        .collect()
}

/// Replaces references with the values they point at
///
/// Known values pass through untouched, so running this twice is a no-op.
fn substitute(
    value: &Value,
    lookup: &dyn Fn(&AttributeRef) -> Lookup,
    mode: ResolveMode,
) -> Result<Value, Unresolved> {
    match value {
        Value::Literal(_) => Ok(value.clone()),
        Value::Deferred(r) => resolve_reference(r, lookup, mode),
        Value::Template(fragments) => {
            let mut out = Vec::with_capacity(fragments.len());
            for fragment in fragments {
                match fragment {
                    Fragment::Text(t) => out.push(Fragment::Text(t.clone())),
                    Fragment::Ref(r) => match resolve_reference(r, lookup, mode)? {
                        Value::Literal(json) => out.push(Fragment::Text(interpolate(&json))),
                        Value::Deferred(inner) => out.push(Fragment::Ref(inner)),
                        Value::Template(inner) => out.extend(inner),
                        Value::List(_) | Value::Map(_) => out.push(Fragment::Ref(r.clone())),
                    },
                }
            }
            Ok(Value::template(out))
        }
        Value::List(items) => Ok(Value::list(
            items
                .iter()
                .map(|item| substitute(item, lookup, mode))
                .collect::<Result<_, _>>()?,
        )),
        Value::Map(entries) => Ok(Value::map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), substitute(v, lookup, mode)?)))
                .collect::<Result<_, Unresolved>>()?,
        )),
    }
}

fn resolve_reference(
    reference: &AttributeRef,
    lookup: &dyn Fn(&AttributeRef) -> Lookup,
    mode: ResolveMode,
) -> Result<Value, Unresolved> {
    match lookup(reference) {
        Lookup::Found(value) => Ok(value),
        Lookup::NotApplied => Err(Unresolved::NotApplied(reference.clone())),
        Lookup::Absent => match mode {
            ResolveMode::Apply => Err(Unresolved::Absent(reference.clone())),
            ResolveMode::Plan => Ok(Value::Deferred(reference.clone())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn parsed(s: &str) -> Value {
        Value::parse_str(s).unwrap()
    }

    /// Computes `arn` and `id` from the node's `name` attribute
    struct FakeEngine {
        applied: Vec<NodeId>,
    }

    impl ApplyEngine for FakeEngine {
        fn apply(&mut self, node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError> {
            self.applied.push(node.id.clone());
            let mut out = ComputedAttributes::new();
            if let Some(Value::Literal(Json::String(name))) = node.attributes.get("name") {
                out.insert("arn".to_string(), json!(format!("arn:test:{}", name)));
                out.insert("id".to_string(), json!(name));
            }
            Ok(out)
        }
    }

    /// Knows nothing until apply time
    struct BlindEngine;

    impl ApplyEngine for BlindEngine {
        fn apply(&mut self, _node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError> {
            Ok(ComputedAttributes::new())
        }
    }

    struct FailingEngine;

    impl ApplyEngine for FailingEngine {
        fn apply(&mut self, _node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError> {
            Err(ApplyError("quota exceeded".to_string()))
        }
    }

    fn website_nodes() -> Vec<ResourceNode> {
        vec![
            ResourceNode::new(id("policy"), "policy")
                .with_attr(
                    "document",
                    Value::from_json(json!({
                        "Resource": ["${bucket.arn}", "${bucket.arn}/*"],
                        "Effect": "Allow"
                    }))
                    .unwrap(),
                )
                .unwrap()
                .with_attr("bucket", parsed("${bucket.id}"))
                .unwrap(),
            ResourceNode::new(id("bucket"), "bucket")
                .with_attr("name", "site")
                .unwrap(),
        ]
    }

    #[test]
    fn apply_substitutes_computed_values() {
        let mut engine = FakeEngine { applied: vec![] };
        let resolution =
            resolve_with(&website_nodes(), &BTreeMap::new(), &mut engine, ResolveMode::Apply).unwrap();

        assert_eq!(engine.applied, vec![id("bucket"), id("policy")]);
        assert!(resolution.is_complete());

        let policy = resolution.get(&id("policy")).unwrap();
        assert_eq!(policy.state, NodeState::Resolved);
        assert_eq!(policy.attributes["bucket"], Value::string("site"));
        assert_eq!(
            policy.attributes["document"],
            Value::Literal(json!({
                "Resource": ["arn:test:site", "arn:test:site/*"],
                "Effect": "Allow"
            }))
        );
    }

    #[test]
    fn references_to_literal_inputs_resolve() {
        let nodes = vec![
            ResourceNode::new(id("bucket"), "bucket").with_attr("name", "site").unwrap(),
            ResourceNode::new(id("copy"), "copy")
                .with_attr("label", parsed("name=${bucket.name}"))
                .unwrap(),
        ];

        let resolution =
            resolve_with(&nodes, &BTreeMap::new(), &mut BlindEngine, ResolveMode::Apply).unwrap();
        assert_eq!(
            resolution.get(&id("copy")).unwrap().attributes["label"],
            Value::string("name=site")
        );
    }

    #[test]
    fn plan_keeps_unknown_values_deferred() {
        let resolution =
            resolve_with(&website_nodes(), &BTreeMap::new(), &mut BlindEngine, ResolveMode::Plan).unwrap();

        assert!(!resolution.is_complete());
        let policy = resolution.get(&id("policy")).unwrap();
        assert_eq!(policy.attributes["bucket"], parsed("${bucket.id}"));
        assert_eq!(
            policy.attributes["document"].to_boundary_json(),
            json!({"Resource": ["${bucket.arn}", "${bucket.arn}/*"], "Effect": "Allow"})
        );
    }

    #[test]
    fn plan_forwards_deferred_chains() {
        let nodes = vec![
            ResourceNode::new(id("bucket"), "bucket").with_attr("name", "site").unwrap(),
            ResourceNode::new(id("web"), "web")
                .with_attr("bucket", parsed("${bucket.id}"))
                .unwrap(),
            ResourceNode::new(id("cdn"), "cdn")
                .with_attr("origin", parsed("https://${web.bucket}"))
                .unwrap(),
        ];

        let resolution =
            resolve_with(&nodes, &BTreeMap::new(), &mut BlindEngine, ResolveMode::Plan).unwrap();
        assert_eq!(
            resolution.get(&id("cdn")).unwrap().attributes["origin"],
            parsed("https://${bucket.id}")
        );
    }

    #[test]
    fn apply_rejects_missing_attribute() {
        let err = resolve_with(&website_nodes(), &BTreeMap::new(), &mut BlindEngine, ResolveMode::Apply)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MissingAttribute { node, reference }
                if node == id("policy") && reference.attribute == "id"
        ));
    }

    #[test]
    fn engine_failure_is_reported() {
        let err = resolve_with(&website_nodes(), &BTreeMap::new(), &mut FailingEngine, ResolveMode::Apply)
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::ApplyFailed {
                node: id("bucket"),
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn ordering_errors_stop_before_any_apply() {
        let nodes = vec![
            ResourceNode::new(id("a"), "x").with_dependency(id("b")),
            ResourceNode::new(id("b"), "x").with_dependency(id("a")),
        ];
        let mut engine = FakeEngine { applied: vec![] };

        let err = resolve_with(&nodes, &BTreeMap::new(), &mut engine, ResolveMode::Apply).unwrap_err();
        assert!(matches!(err, ResolveError::CycleDetected(_)));
        assert!(engine.applied.is_empty());
    }

    #[test]
    fn exports_resolve_after_all_nodes() {
        let mut exports = BTreeMap::new();
        exports.insert("bucket_arn".to_string(), parsed("${bucket.arn}"));
        exports.insert("static".to_string(), Value::string("v1"));

        let resolution = resolve_with(
            &website_nodes(),
            &exports,
            &mut FakeEngine { applied: vec![] },
            ResolveMode::Apply,
        )
        .unwrap();

        assert_eq!(resolution.outputs["bucket_arn"], Value::string("arn:test:site"));
        assert_eq!(resolution.outputs["static"], Value::string("v1"));
    }

    #[test]
    fn export_to_unknown_node_fails() {
        let mut exports = BTreeMap::new();
        exports.insert("endpoint".to_string(), parsed("${ghost.endpoint}"));

        let err = resolve_with(&website_nodes(), &exports, &mut BlindEngine, ResolveMode::Plan).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnresolvedExport { export, .. } if export == "endpoint"
        ));
    }

    #[test]
    fn substitution_is_idempotent() {
        let resolution = resolve_with(
            &website_nodes(),
            &BTreeMap::new(),
            &mut FakeEngine { applied: vec![] },
            ResolveMode::Apply,
        )
        .unwrap();

        for node in &resolution.nodes {
            let again = resolution.substitute(&node.attributes, ResolveMode::Apply).unwrap();
            assert_eq!(again, node.attributes);
        }
    }
}

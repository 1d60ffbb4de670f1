//! Reference graph for resource nodes
//!
//! Builds the dependency graph implied by attribute references and explicit
//! `depends_on` lists, then produces a deterministic application order.
//! Uses petgraph for graph storage and strongly connected components.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::id::{AttributeRef, NodeId};
use super::node::ResourceNode;

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Dependency cycle detected: {}", join_cycle(.0))]
    CycleDetected(Vec<NodeId>),

    #[error("Node '{from}' references unknown node '{target}'")]
    UnknownReference { from: NodeId, target: NodeId },

    #[error("Duplicate node identifier: {0}")]
    DuplicateIdentifier(NodeId),

    #[error("Node '{node}' was reached before its dependency '{target}' was resolved")]
    OrderViolation { node: NodeId, target: NodeId },

    #[error("Node '{node}' references '{reference}', which is not provided by '{}'", .reference.node)]
    MissingAttribute { node: NodeId, reference: AttributeRef },

    #[error("Failed to apply node '{node}': {message}")]
    ApplyFailed { node: NodeId, message: String },

    #[error("Output '{export}' references '{reference}', which does not resolve")]
    UnresolvedExport { export: String, reference: AttributeRef },
}

fn join_cycle(cycle: &[NodeId]) -> String {
    cycle
        .iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Computes the application order for a set of nodes
///
/// Every node appears after all nodes it references or explicitly depends on.
/// Nodes with no remaining dependency are taken in declaration order.
pub fn resolve(nodes: &[ResourceNode]) -> Result<Vec<NodeId>, ResolveError> {
    ReferenceGraph::build(nodes)?.topological_order()
}

/// A dependency graph over resource nodes
///
/// Edges point from a dependency to its dependent, so `a -> b` means
/// "a must apply before b". Node indices follow declaration order.
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<NodeId, ()>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from declared nodes
    ///
    /// Checks run in a fixed order: duplicates, then dangling references.
    /// Cycles are reported by [`ReferenceGraph::topological_order`].
    pub fn build(nodes: &[ResourceNode]) -> Result<Self, ResolveError> {
        let mut graph = Self::new();

        // First pass: add all nodes
        for node in nodes {
            graph.add_node(node.id.clone())?;
        }

        // Second pass: add all edges
        for node in nodes {
            for dep_id in node.dependency_ids() {
                graph.add_dependency(&node.id, dep_id)?;
            }
        }

        Ok(graph)
    }

    /// Adds a node, rejecting duplicate identifiers
    pub fn add_node(&mut self, id: NodeId) -> Result<(), ResolveError> {
        if self.node_map.contains_key(&id) {
            return Err(ResolveError::DuplicateIdentifier(id));
        }
        let idx = self.graph.add_node(id.clone());
        self.node_map.insert(id, idx);
        Ok(())
    }

    /// Adds a dependency edge: `node` depends on `depends_on`
    ///
    /// Self-dependencies are kept; they surface as a one-node cycle. Each call
    /// adds an edge, so callers pass each pair once.
    pub fn add_dependency(&mut self, node: &NodeId, depends_on: &NodeId) -> Result<(), ResolveError> {
        let node_idx = *self
            .node_map
            .get(node)
            .ok_or_else(|| ResolveError::UnknownReference {
                from: node.clone(),
                target: node.clone(),
            })?;

        let dep_idx = *self
            .node_map
            .get(depends_on)
            .ok_or_else(|| ResolveError::UnknownReference {
                from: node.clone(),
                target: depends_on.clone(),
            })?;

        self.graph.add_edge(dep_idx, node_idx, ());
        Ok(())
    }

    /// Returns all nodes in application order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<NodeId>, ResolveError> {
        let count = self.graph.node_count();
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();

        // Min-heap on declaration index keeps ties stable
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.graph[idx].clone());

            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < count {
            return Err(ResolveError::CycleDetected(self.find_cycle()));
        }

        Ok(order)
    }

    /// Finds one cycle, starting and ending at its earliest-declared node
    ///
    /// Each element depends on the element that follows it.
    fn find_cycle(&self) -> Vec<NodeId> {
        let cyclic = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .filter_map(|scc| {
                let start = *scc.iter().min()?;
                Some((start, scc))
            })
            .min_by_key(|(start, _)| *start);

        let Some((start, scc)) = cyclic else {
            return Vec::new();
        };
        let members: HashSet<NodeIndex> = scc.into_iter().collect();

        // Shortest path back to `start` following "depends on" edges
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for dep in self.sorted_neighbors(current, Direction::Incoming) {
                if !members.contains(&dep) {
                    continue;
                }

                if dep == start {
                    let mut path = vec![current];
                    let mut cursor = current;
                    while let Some(&prev) = parent.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    path.push(start);
                    return path.into_iter().map(|idx| self.graph[idx].clone()).collect();
                }

                if !parent.contains_key(&dep) {
                    parent.insert(dep, current);
                    queue.push_back(dep);
                }
            }
        }

        Vec::new()
    }

    fn sorted_neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<_> = self.graph.neighbors_directed(idx, dir).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Returns the direct dependencies of a node, in declaration order
    pub fn dependencies(&self, id: &NodeId) -> Vec<NodeId> {
        self.neighbors_of(id, Direction::Incoming)
    }

    /// Returns the direct dependents of a node (nodes that depend on it)
    pub fn dependents(&self, id: &NodeId) -> Vec<NodeId> {
        self.neighbors_of(id, Direction::Outgoing)
    }

    fn neighbors_of(&self, id: &NodeId, dir: Direction) -> Vec<NodeId> {
        match self.node_map.get(id) {
            Some(idx) => self
                .sorted_neighbors(*idx, dir)
                .into_iter()
                .map(|n| self.graph[n].clone())
                .collect(),
            None => vec![],
        }
    }

    /// Returns true if the graph contains the node
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Returns the number of nodes in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Returns the number of dependency edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns all node IDs in declaration order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::Value;
    use proptest::prelude::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn node(name: &str, deps: &[&str]) -> ResourceNode {
        deps.iter()
            .fold(ResourceNode::new(id(name), "test"), |n, d| n.with_dependency(id(d)))
    }

    fn referencing(name: &str, target: &str, attr: &str) -> ResourceNode {
        ResourceNode::new(id(name), "test")
            .with_attr("input", Value::Deferred(id(target).attr(attr).unwrap()))
            .unwrap()
    }

    fn ids(order: &[NodeId]) -> Vec<&str> {
        order.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn empty_input() {
        assert!(resolve(&[]).unwrap().is_empty());
        assert!(ReferenceGraph::new().is_empty());
    }

    #[test]
    fn chain_in_declaration_order() {
        let nodes = [node("A", &[]), node("B", &["A"]), node("C", &["A", "B"])];
        assert_eq!(ids(&resolve(&nodes).unwrap()), vec!["A", "B", "C"]);
    }

    #[test]
    fn dependencies_move_ahead_of_dependents() {
        let nodes = [node("C", &["B"]), node("B", &["A"]), node("A", &[])];
        assert_eq!(ids(&resolve(&nodes).unwrap()), vec!["A", "B", "C"]);
    }

    #[test]
    fn ties_broken_by_declaration_order() {
        let nodes = [
            node("late", &["root"]),
            node("solo", &[]),
            node("root", &[]),
            node("early", &["root"]),
        ];
        assert_eq!(
            ids(&resolve(&nodes).unwrap()),
            vec!["solo", "root", "late", "early"]
        );
    }

    #[test]
    fn attribute_references_create_edges() {
        let nodes = [referencing("policy", "bucket", "arn"), node("bucket", &[])];
        assert_eq!(ids(&resolve(&nodes).unwrap()), vec!["bucket", "policy"]);
    }

    #[test]
    fn two_node_cycle_detected() {
        let nodes = [node("X", &["Y"]), node("Y", &["X"])];
        let err = resolve(&nodes).unwrap_err();
        assert_eq!(err, ResolveError::CycleDetected(vec![id("X"), id("Y"), id("X")]));
        assert_eq!(err.to_string(), "Dependency cycle detected: X -> Y -> X");
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let nodes = [node("ok", &[]), referencing("loop", "loop", "arn")];
        assert_eq!(
            resolve(&nodes).unwrap_err(),
            ResolveError::CycleDetected(vec![id("loop"), id("loop")])
        );
    }

    #[test]
    fn cycle_behind_acyclic_prefix() {
        let nodes = [
            node("a", &[]),
            node("b", &["a", "d"]),
            node("c", &["b"]),
            node("d", &["c"]),
        ];
        assert_eq!(
            resolve(&nodes).unwrap_err(),
            ResolveError::CycleDetected(vec![id("b"), id("d"), id("c"), id("b")])
        );
    }

    #[test]
    fn unknown_reference_names_both_nodes() {
        let nodes = [node("P", &["Q"])];
        assert_eq!(
            resolve(&nodes).unwrap_err(),
            ResolveError::UnknownReference { from: id("P"), target: id("Q") }
        );
    }

    #[test]
    fn unknown_attribute_reference_target() {
        let nodes = [referencing("policy", "missing", "arn")];
        assert!(matches!(
            resolve(&nodes),
            Err(ResolveError::UnknownReference { target, .. }) if target == id("missing")
        ));
    }

    #[test]
    fn duplicate_identifier_rejected() {
        let nodes = [node("A", &[]), node("A", &[])];
        assert_eq!(
            resolve(&nodes).unwrap_err(),
            ResolveError::DuplicateIdentifier(id("A"))
        );
    }

    #[test]
    fn dependencies_and_dependents() {
        let nodes = [node("A", &[]), node("B", &["A"]), node("C", &["A", "B"])];
        let graph = ReferenceGraph::build(&nodes).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.dependencies(&id("C")), vec![id("A"), id("B")]);
        assert_eq!(graph.dependents(&id("A")), vec![id("B"), id("C")]);
        assert!(graph.dependencies(&id("nope")).is_empty());
        assert_eq!(ids(&graph.node_ids().cloned().collect::<Vec<_>>()), vec!["A", "B", "C"]);
    }

    #[test]
    fn reference_and_explicit_dependency_share_one_edge() {
        let n = referencing("policy", "bucket", "arn").with_dependency(id("bucket"));
        let graph = ReferenceGraph::build(&[node("bucket", &[]), n]).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn long_chain_declared_backwards() {
        use std::time::Instant;

        let names: Vec<String> = (0..2000).map(|i| format!("n{}", i)).collect();
        let nodes: Vec<ResourceNode> = (0..2000)
            .rev()
            .map(|i| {
                if i == 0 {
                    node(&names[i], &[])
                } else {
                    node(&names[i], &[names[i - 1].as_str()])
                }
            })
            .collect();

        let start = Instant::now();
        let order = resolve(&nodes).unwrap();
        let duration = start.elapsed();

        assert_eq!(order.first(), Some(&id("n0")));
        assert_eq!(order.last(), Some(&id("n1999")));
        assert!(duration.as_millis() < 250, "Resolve took {:?}", duration);
    }

    #[test]
    fn wide_star_around_one_hub() {
        use std::time::Instant;

        let n = 20_000;
        let mut nodes = vec![node("hub", &[])];
        nodes.extend((0..n).map(|i| referencing(&format!("leaf{}", i), "hub", "id")));

        let start = Instant::now();
        let order = resolve(&nodes).unwrap();
        let duration = start.elapsed();

        assert_eq!(order.len(), n + 1);
        assert_eq!(order[0], id("hub"));
        assert_eq!(order[1], id("leaf0"));
        assert_eq!(order[n], id(&format!("leaf{}", n - 1)));
        assert!(duration.as_millis() < 2000, "Resolve took {:?}", duration);
    }

    #[test]
    fn wide_fan_out_into_one_sink() {
        use std::time::Instant;

        let n = 20_000;
        let names: Vec<String> = (0..n).map(|i| format!("src{}", i)).collect();
        let mut nodes: Vec<ResourceNode> = names.iter().map(|name| node(name, &[])).collect();
        let sink = names
            .iter()
            .chain(names.iter())
            .fold(ResourceNode::new(id("sink"), "test"), |acc, d| acc.with_dependency(id(d)));
        nodes.push(sink);

        let start = Instant::now();
        let graph = ReferenceGraph::build(&nodes).unwrap();
        let order = graph.topological_order().unwrap();
        let duration = start.elapsed();

        assert_eq!(graph.edge_count(), n);
        assert_eq!(order.last(), Some(&id("sink")));
        assert!(duration.as_millis() < 2000, "Resolve took {:?}", duration);
    }

    /// Random DAG: node `i` may depend on any node ranked below it
    fn dag_strategy() -> impl Strategy<Value = Vec<ResourceNode>> {
        (1usize..24)
            .prop_flat_map(|n| {
                (
                    Just(n),
                    Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                    prop::collection::vec(any::<bool>(), n * n),
                )
            })
            .prop_map(|(n, rank, edges)| {
                (0..n)
                    .map(|i| {
                        let deps: Vec<String> = (0..n)
                            .filter(|&j| rank[j] < rank[i] && edges[i * n + j])
                            .map(|j| format!("n{}", j))
                            .collect();
                        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                        node(&format!("n{}", i), &deps)
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn order_respects_every_dependency(nodes in dag_strategy()) {
            let order = resolve(&nodes).unwrap();
            prop_assert_eq!(order.len(), nodes.len());

            let position: HashMap<&NodeId, usize> =
                order.iter().enumerate().map(|(i, id)| (id, i)).collect();
            for n in &nodes {
                for dep in n.dependency_ids() {
                    prop_assert!(position[dep] < position[&n.id]);
                }
            }
        }

        #[test]
        fn order_is_deterministic(nodes in dag_strategy()) {
            prop_assert_eq!(resolve(&nodes).unwrap(), resolve(&nodes).unwrap());
        }

        #[test]
        fn closing_a_ring_reports_a_real_cycle(size in 2usize..12, extra in 0usize..6) {
            let mut nodes: Vec<ResourceNode> = (0..size)
                .map(|i| {
                    let next = format!("r{}", (i + 1) % size);
                    node(&format!("r{}", i), &[next.as_str()])
                })
                .collect();
            nodes.extend((0..extra).map(|i| node(&format!("x{}", i), &["r0"])));

            let err = resolve(&nodes).unwrap_err();
            let ResolveError::CycleDetected(cycle) = err else {
                return Err(TestCaseError::fail("expected a cycle"));
            };

            prop_assert!(cycle.len() >= 2);
            prop_assert_eq!(cycle.first(), cycle.last());
            let by_id: HashMap<&NodeId, &ResourceNode> =
                nodes.iter().map(|n| (&n.id, n)).collect();
            for pair in cycle.windows(2) {
                prop_assert!(by_id[&pair[0]].dependency_ids().contains(&&pair[1]));
            }
        }
    }
}

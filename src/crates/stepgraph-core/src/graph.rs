//! Graph definition and structural validation
//!
//! A [`Graph`] is the mutable description a [`StateGraph`] accumulates:
//! nodes, plain edges and conditional edges. It knows nothing about hooks
//! or checkpoints; [`Graph::validate`] checks only the shape.
//!
//! # Graph Structure
//!
//! ```text
//!   __start__
//!       │
//!       ▼
//!   ┌────────┐   plain    ┌────────┐
//!   │ agent  │──────────▶│ tools  │
//!   └────────┘            └────────┘
//!       │ conditional          │
//!       │ {"continue": tools,  │
//!       │  "stop": __end__}    │
//!       ▼                      │
//!    __end__ ◀─────────────────┘
//! ```
//!
//! Edges leaving one source are either one conditional edge or one or more
//! plain edges. Several plain edges form a parallel fan-out: every branch
//! must be an action node with a single plain edge to the same join node.
//!
//! [`StateGraph`]: crate::builder::StateGraph

use crate::error::{GraphError, Result};
use crate::hook::{EdgeAction, NodeAction};
use crate::subgraph::SubgraphNode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Node identifier
pub type NodeId = String;

/// Entry sentinel
pub const START: &str = "__start__";

/// Termination sentinel
pub const END: &str = "__end__";

const PARALLEL_PREFIX: &str = "__parallel__";

/// Id of the node synthesized for the fan-out leaving `source`
pub fn parallel_node_id(source: &str) -> NodeId {
    format!("{PARALLEL_PREFIX}({source})")
}

/// What runs when a node executes
#[derive(Clone)]
pub enum NodeKind {
    /// An async action returning a delta
    Action(NodeAction),
    /// A nested compiled graph
    Subgraph(Arc<SubgraphNode>),
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Action(_) => f.write_str("Action(<function>)"),
            NodeKind::Subgraph(node) => f.debug_tuple("Subgraph").field(node).finish(),
        }
    }
}

/// Routing function of a conditional edge plus its permitted targets
#[derive(Clone)]
pub struct ConditionalEdge {
    pub router: EdgeAction,
    /// Routing label to target node
    pub mappings: HashMap<String, NodeId>,
}

impl std::fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("router", &"<function>")
            .field("mappings", &self.mappings)
            .finish()
    }
}

/// Outgoing edge of a node
#[derive(Debug, Clone)]
pub enum Edge {
    /// Unconditional edge to a specific node
    Direct(NodeId),
    /// Routes through a router whose label selects the target
    Conditional(ConditionalEdge),
}

/// Branches of a parallel fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelEdge {
    pub source: NodeId,
    pub branches: Vec<NodeId>,
    pub join: NodeId,
}

/// Nodes and edges of a graph under construction
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, NodeKind>,
    node_order: Vec<NodeId>,
    edges: HashMap<NodeId, Vec<Edge>>,
    errors: Vec<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node; a duplicate id is reported by [`validate`](Self::validate)
    pub fn add_node(&mut self, id: NodeId, kind: NodeKind) {
        if self.nodes.contains_key(&id) {
            self.errors.push(format!("node '{id}' is declared more than once"));
            return;
        }
        self.node_order.push(id.clone());
        self.nodes.insert(id, kind);
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    pub fn add_conditional_edge(&mut self, from: NodeId, edge: ConditionalEdge) {
        self.edges.entry(from).or_default().push(Edge::Conditional(edge));
    }

    pub fn node(&self, id: &str) -> Option<&NodeKind> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in declaration order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_order
    }

    pub fn edges_from(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Sources whose outgoing edge is conditional
    pub fn conditional_sources(&self) -> impl Iterator<Item = &NodeId> {
        self.edges.iter().filter_map(|(source, edges)| {
            matches!(edges.as_slice(), [Edge::Conditional(_)]).then_some(source)
        })
    }

    /// Every fan-out, sources in declaration order with `START` first
    pub fn parallel_edges(&self) -> Vec<ParallelEdge> {
        std::iter::once(START.to_string())
            .chain(self.node_order.iter().cloned())
            .filter_map(|source| {
                let edges = self.edges.get(&source)?;
                if edges.len() < 2 {
                    return None;
                }
                let branches: Vec<NodeId> = edges
                    .iter()
                    .filter_map(|edge| match edge {
                        Edge::Direct(target) => Some(target.clone()),
                        Edge::Conditional(_) => None,
                    })
                    .collect();
                let join = branches.first().and_then(|b| match self.edges_from(b) {
                    [Edge::Direct(join)] => Some(join.clone()),
                    _ => None,
                })?;
                Some(ParallelEdge {
                    source,
                    branches,
                    join,
                })
            })
            .collect()
    }

    /// Check the graph's shape
    pub fn validate(&self) -> Result<()> {
        if let Some(error) = self.errors.first() {
            return Err(GraphError::Validation(error.clone()));
        }

        for id in &self.node_order {
            if id == START || id == END {
                return invalid(format!("'{id}' is a reserved node id"));
            }
            if id.starts_with(PARALLEL_PREFIX) {
                return invalid(format!("node id '{id}' uses the reserved '{PARALLEL_PREFIX}' prefix"));
            }
            if id.is_empty() || id.contains(crate::path::DELIMITER) {
                return invalid(format!("node id '{id}' must be non-empty and must not contain '/'"));
            }
        }

        if self.edges_from(START).is_empty() {
            return invalid("missing an edge from __start__".to_string());
        }

        let mut sources: Vec<&NodeId> = self.edges.keys().collect();
        sources.sort();
        for source in sources {
            self.validate_edges_from(source)?;
        }

        self.validate_reachability()?;

        for id in &self.node_order {
            if self.edges_from(id).is_empty() {
                return invalid(format!("node '{id}' has no outgoing edge"));
            }
        }
        Ok(())
    }

    fn validate_edges_from(&self, source: &str) -> Result<()> {
        if source == END {
            return invalid("__end__ cannot be the source of an edge".to_string());
        }
        if source != START && !self.nodes.contains_key(source) {
            return invalid(format!("edge source '{source}' is not a declared node"));
        }

        let edges = self.edges_from(source);
        let conditional = edges
            .iter()
            .filter(|e| matches!(e, Edge::Conditional(_)))
            .count();
        if conditional > 1 {
            return invalid(format!("node '{source}' has more than one conditional edge"));
        }
        if conditional == 1 && edges.len() > 1 {
            return invalid(format!(
                "node '{source}' mixes a conditional edge with plain edges"
            ));
        }

        for edge in edges {
            match edge {
                Edge::Direct(target) => self.validate_target(source, target)?,
                Edge::Conditional(cond) => {
                    if cond.mappings.is_empty() {
                        return invalid(format!(
                            "conditional edge from '{source}' declares no targets"
                        ));
                    }
                    for target in cond.mappings.values() {
                        self.validate_target(source, target)?;
                    }
                }
            }
        }

        if edges.len() > 1 {
            self.validate_fan_out(source, edges)?;
        }
        Ok(())
    }

    fn validate_target(&self, source: &str, target: &str) -> Result<()> {
        if target == START {
            return invalid(format!("edge from '{source}' targets __start__"));
        }
        if target != END && !self.nodes.contains_key(target) {
            return invalid(format!(
                "edge from '{source}' targets '{target}', which is not a declared node"
            ));
        }
        Ok(())
    }

    fn validate_fan_out(&self, source: &str, edges: &[Edge]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut join: Option<&NodeId> = None;
        for edge in edges {
            let Edge::Direct(branch) = edge else {
                continue;
            };
            if !seen.insert(branch) {
                return invalid(format!("duplicate parallel branch '{branch}' from '{source}'"));
            }
            match self.nodes.get(branch) {
                Some(NodeKind::Action(_)) => {}
                Some(NodeKind::Subgraph(_)) => {
                    return invalid(format!("parallel branch '{branch}' cannot be a subgraph"))
                }
                None => return invalid(format!("parallel branch '{branch}' must be a node")),
            }
            let branch_join = match self.edges_from(branch) {
                [Edge::Direct(target)] => target,
                _ => {
                    return invalid(format!(
                        "parallel branch '{branch}' must have a single plain edge to a join node"
                    ))
                }
            };
            match join {
                None => join = Some(branch_join),
                Some(existing) if existing != branch_join => {
                    return invalid(format!(
                        "parallel branches from '{source}' join at different nodes ('{existing}', '{branch_join}')"
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(join) = join {
            if seen.contains(join) {
                return invalid(format!("parallel join '{join}' is also a branch of '{source}'"));
            }
        }
        Ok(())
    }

    fn validate_reachability(&self) -> Result<()> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([START]);
        while let Some(current) = queue.pop_front() {
            for edge in self.edges_from(current) {
                let targets: Vec<&str> = match edge {
                    Edge::Direct(target) => vec![target.as_str()],
                    Edge::Conditional(cond) => cond.mappings.values().map(String::as_str).collect(),
                };
                for target in targets {
                    if reached.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        match self.node_order.iter().find(|id| !reached.contains(id.as_str())) {
            Some(id) => invalid(format!("node '{id}' is not reachable from __start__")),
            None => Ok(()),
        }
    }
}

fn invalid(message: String) -> Result<()> {
    Err(GraphError::Validation(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::hook::action;
    use crate::state::Delta;

    fn noop() -> NodeKind {
        NodeKind::Action(action(|_state, _config| async { Ok(Delta::new()) }))
    }

    fn router(mappings: &[(&str, &str)]) -> ConditionalEdge {
        ConditionalEdge {
            router: action(|_state, _config| async { Ok(Command::goto("x")) }),
            mappings: mappings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn linear(ids: &[&str]) -> Graph {
        let mut graph = Graph::new();
        let mut prev = START.to_string();
        for id in ids {
            graph.add_node(id.to_string(), noop());
            graph.add_edge(prev, id.to_string());
            prev = id.to_string();
        }
        graph.add_edge(prev, END.to_string());
        graph
    }

    fn message(graph: &Graph) -> String {
        match graph.validate() {
            Err(GraphError::Validation(msg)) => msg,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_linear_graph_is_valid() {
        assert!(linear(&["a", "b"]).validate().is_ok());
    }

    #[test]
    fn test_missing_target() {
        let mut graph = linear(&["a"]);
        graph.add_edge("a".to_string(), "ghost".to_string());
        assert!(message(&graph).contains("ghost"));
    }

    #[test]
    fn test_duplicate_node() {
        let mut graph = linear(&["a"]);
        graph.add_node("a".to_string(), noop());
        assert!(message(&graph).contains("more than once"));
    }

    #[test]
    fn test_missing_start() {
        let mut graph = Graph::new();
        graph.add_node("a".to_string(), noop());
        graph.add_edge("a".to_string(), END.to_string());
        assert!(message(&graph).contains("__start__"));
    }

    #[test]
    fn test_unreachable_node() {
        let mut graph = linear(&["a"]);
        graph.add_node("island".to_string(), noop());
        graph.add_edge("island".to_string(), END.to_string());
        assert!(message(&graph).contains("not reachable"));
    }

    #[test]
    fn test_node_without_outgoing_edge() {
        let mut graph = Graph::new();
        graph.add_node("a".to_string(), noop());
        graph.add_edge(START.to_string(), "a".to_string());
        assert!(message(&graph).contains("no outgoing edge"));
    }

    #[test]
    fn test_reserved_and_delimited_ids() {
        let mut graph = linear(&["a/b"]);
        assert!(message(&graph).contains("'/'"));

        graph = linear(&["__parallel__(x)"]);
        assert!(message(&graph).contains("reserved"));
    }

    #[test]
    fn test_end_cannot_be_source() {
        let mut graph = linear(&["a"]);
        graph.add_edge(END.to_string(), "a".to_string());
        assert!(message(&graph).contains("__end__ cannot"));
    }

    #[test]
    fn test_conditional_targets_are_checked() {
        let mut graph = Graph::new();
        graph.add_node("a".to_string(), noop());
        graph.add_edge(START.to_string(), "a".to_string());
        graph.add_conditional_edge("a".to_string(), router(&[("go", "nowhere")]));
        assert!(message(&graph).contains("nowhere"));
    }

    #[test]
    fn test_conditional_and_plain_do_not_mix() {
        let mut graph = linear(&["a"]);
        graph.add_conditional_edge("a".to_string(), router(&[("stop", END)]));
        assert!(message(&graph).contains("mixes"));
    }

    #[test]
    fn test_fan_out() {
        let mut graph = Graph::new();
        for id in ["a", "b1", "b2", "join"] {
            graph.add_node(id.to_string(), noop());
        }
        graph.add_edge(START.to_string(), "a".to_string());
        graph.add_edge("a".to_string(), "b1".to_string());
        graph.add_edge("a".to_string(), "b2".to_string());
        graph.add_edge("b1".to_string(), "join".to_string());
        graph.add_edge("b2".to_string(), "join".to_string());
        graph.add_edge("join".to_string(), END.to_string());

        assert!(graph.validate().is_ok());
        assert_eq!(
            graph.parallel_edges(),
            vec![ParallelEdge {
                source: "a".to_string(),
                branches: vec!["b1".to_string(), "b2".to_string()],
                join: "join".to_string(),
            }]
        );
        assert_eq!(parallel_node_id("a"), "__parallel__(a)");
    }

    #[test]
    fn test_fan_out_requires_common_join() {
        let mut graph = Graph::new();
        for id in ["b1", "b2", "j1"] {
            graph.add_node(id.to_string(), noop());
        }
        graph.add_edge(START.to_string(), "b1".to_string());
        graph.add_edge(START.to_string(), "b2".to_string());
        graph.add_edge("b1".to_string(), "j1".to_string());
        graph.add_edge("b2".to_string(), END.to_string());
        graph.add_edge("j1".to_string(), END.to_string());

        assert!(message(&graph).contains("different nodes"));
    }
}

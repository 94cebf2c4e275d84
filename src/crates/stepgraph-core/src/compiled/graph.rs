//! CompiledGraph struct and lookup tables
//!
//! Compilation flattens the builder's edge lists into one route per node.
//! Each parallel fan-out becomes a synthetic `__parallel__(<source>)` node
//! that runs the branches together and routes to their join node:
//!
//! ```text
//! builder:   src ──▶ b1 ──┐            compiled:  src ──▶ __parallel__(src) ──▶ join
//!             └────▶ b2 ──┴──▶ join                         runs b1 ∥ b2
//! ```

use crate::config::CompileConfig;
use crate::graph::{parallel_node_id, ConditionalEdge, Edge, Graph, NodeId, NodeKind, ParallelEdge, START};
use crate::hook::{EdgeHooks, NodeAction, NodeHooks};
use crate::state::Schema;
use crate::subgraph::SubgraphNode;
use std::collections::HashMap;
use std::sync::Arc;
use stepgraph_checkpoint::CheckpointSaver;

/// Executable form of a node
#[derive(Clone)]
pub(crate) enum CompiledNode {
    Action(NodeAction),
    Subgraph(Arc<SubgraphNode>),
    /// Branches of a fan-out, run concurrently
    Parallel(Vec<(NodeId, NodeAction)>),
}

/// Where a node goes next
#[derive(Debug, Clone)]
pub(crate) enum Route {
    Direct(NodeId),
    Conditional(ConditionalEdge),
}

pub(crate) struct CompiledInner {
    pub(crate) nodes: HashMap<NodeId, CompiledNode>,
    pub(crate) routes: HashMap<NodeId, Route>,
    pub(crate) node_order: Vec<NodeId>,
    pub(crate) schema: Schema,
    pub(crate) node_hooks: NodeHooks,
    pub(crate) edge_hooks: EdgeHooks,
    pub(crate) config: CompileConfig,
}

/// Compiled graph ready for execution
///
/// Cheap to clone; clones share the same immutable graph. Safe to run
/// concurrently on different threads of the checkpoint store.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) inner: Arc<CompiledInner>,
}

impl CompiledGraph {
    pub(crate) fn from_parts(
        graph: Graph,
        parallel: Vec<ParallelEdge>,
        schema: Schema,
        node_hooks: NodeHooks,
        edge_hooks: EdgeHooks,
        config: CompileConfig,
    ) -> Self {
        let mut nodes: HashMap<NodeId, CompiledNode> = graph
            .node_ids()
            .iter()
            .filter_map(|id| {
                let node = match graph.node(id)? {
                    NodeKind::Action(action) => CompiledNode::Action(action.clone()),
                    NodeKind::Subgraph(sub) => CompiledNode::Subgraph(sub.clone()),
                };
                Some((id.clone(), node))
            })
            .collect();

        let mut routes = HashMap::new();
        for source in std::iter::once(START.to_string()).chain(graph.node_ids().iter().cloned()) {
            let route = match graph.edges_from(&source) {
                [Edge::Direct(target)] => Route::Direct(target.clone()),
                [Edge::Conditional(edge)] => Route::Conditional(edge.clone()),
                _ => continue,
            };
            routes.insert(source, route);
        }

        for edge in parallel {
            let id = parallel_node_id(&edge.source);
            let branches = edge
                .branches
                .iter()
                .filter_map(|branch| match graph.node(branch) {
                    Some(NodeKind::Action(action)) => Some((branch.clone(), action.clone())),
                    _ => None,
                })
                .collect();
            nodes.insert(id.clone(), CompiledNode::Parallel(branches));
            routes.insert(id.clone(), Route::Direct(edge.join));
            routes.insert(edge.source, Route::Direct(id));
        }

        Self {
            inner: Arc::new(CompiledInner {
                nodes,
                routes,
                node_order: graph.node_ids().to_vec(),
                schema,
                node_hooks,
                edge_hooks,
                config,
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn config(&self) -> &CompileConfig {
        &self.inner.config
    }

    pub fn checkpoint_saver(&self) -> Option<&Arc<dyn CheckpointSaver>> {
        self.inner.config.checkpoint_saver.as_ref()
    }

    /// Declared node ids, in declaration order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.inner.node_order
    }

    pub fn graph_id(&self) -> Option<&str> {
        self.inner.config.graph_id.as_deref()
    }

    /// True when `node_id` runs a nested graph
    pub fn is_subgraph_node(&self, node_id: &str) -> bool {
        matches!(self.inner.nodes.get(node_id), Some(CompiledNode::Subgraph(_)))
    }

    /// The nested graph run by `node_id`
    pub fn subgraph(&self, node_id: &str) -> Option<&CompiledGraph> {
        match self.inner.nodes.get(node_id) {
            Some(CompiledNode::Subgraph(sub)) => Some(sub.graph()),
            _ => None,
        }
    }

    pub(crate) fn node(&self, node_id: &str) -> Option<&CompiledNode> {
        self.inner.nodes.get(node_id)
    }

    pub(crate) fn route_from(&self, node_id: &str) -> Option<&Route> {
        self.inner.routes.get(node_id)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.inner.node_order)
            .field("schema", &self.inner.schema)
            .field("config", &self.inner.config)
            .finish()
    }
}

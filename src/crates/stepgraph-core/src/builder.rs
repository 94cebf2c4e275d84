//! StateGraph builder API
//!
//! [`StateGraph`] accumulates nodes, edges and hook registrations over a
//! [`Schema`], then [`compile`](StateGraph::compile)s them into an
//! immutable [`CompiledGraph`]. All structural checks run at compile time;
//! a graph that compiles never fails at run time because of its shape.
//!
//! ```text
//! StateGraph::new(schema)
//!     .add_node(..)              nodes: async (State, RunConfig) -> Delta
//!     .add_subgraph(..)          nodes: nested CompiledGraph
//!     .add_edge(..)              plain edges (several = parallel fan-out)
//!     .add_conditional_edges(..) router label -> target
//!     .add_*_hook(..)            before / after / wrap, global or per id
//!         │
//!         │ compile_with(CompileConfig)
//!         ▼
//! CompiledGraph
//! ```
//!
//! # Example
//!
//! ```rust
//! use stepgraph_core::{Channel, Delta, Schema, StateGraph, END, START};
//!
//! let schema = Schema::new().with_channel("messages", Channel::appender());
//! let mut graph = StateGraph::new(schema);
//!
//! graph
//!     .add_node("greet", |_state, _config| async {
//!         Ok(Delta::new().set("messages", "hello"))
//!     })
//!     .add_node("classify", |state, _config| async move {
//!         let count = state.value::<Vec<String>>("messages").unwrap_or_default().len();
//!         Ok(Delta::new().set("long", count > 3))
//!     })
//!     .add_edge(START, "greet")
//!     .add_edge("greet", "classify")
//!     .add_conditional_edges(
//!         "classify",
//!         |state, _config| async move {
//!             let long = state.value::<bool>("long").unwrap_or(false);
//!             Ok(if long { "done" } else { "again" }.to_string())
//!         },
//!         [("again", "greet"), ("done", END)],
//!     );
//!
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.node_ids().len(), 2);
//! ```

use crate::command::Command;
use crate::compiled::CompiledGraph;
use crate::config::{CompileConfig, RunConfig};
use crate::error::{GraphError, Result};
use crate::graph::{ConditionalEdge, Graph, NodeId, NodeKind};
use crate::hook::{
    action, AfterHook, BeforeHook, EdgeAction, EdgeHooks, NodeAction, NodeHooks, WrapHook,
};
use crate::state::{Delta, Schema, State};
use crate::subgraph::{SubgraphConfig, SubgraphNode};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Builder for a state graph
#[derive(Debug, Clone)]
pub struct StateGraph {
    schema: Schema,
    graph: Graph,
    node_hooks: NodeHooks,
    edge_hooks: EdgeHooks,
}

impl StateGraph {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            graph: Graph::new(),
            node_hooks: NodeHooks::new(),
            edge_hooks: EdgeHooks::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Add an action node
    ///
    /// The action receives the current state and the run config and returns
    /// the delta to merge. Returning [`GraphError::Interrupted`] suspends the
    /// run at this node instead of failing it.
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, f: F) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Delta>> + Send + 'static,
    {
        self.add_node_action(id, action(f))
    }

    /// Add an action node from a shared action
    pub fn add_node_action(&mut self, id: impl Into<NodeId>, node: NodeAction) -> &mut Self {
        self.graph.add_node(id.into(), NodeKind::Action(node));
        self
    }

    /// Add a compiled graph as a node, passing every key both ways
    pub fn add_subgraph(&mut self, id: impl Into<NodeId>, subgraph: CompiledGraph) -> &mut Self {
        self.add_subgraph_with(id, subgraph, SubgraphConfig::default())
    }

    /// Add a compiled graph as a node with key filters
    pub fn add_subgraph_with(
        &mut self,
        id: impl Into<NodeId>,
        subgraph: CompiledGraph,
        config: SubgraphConfig,
    ) -> &mut Self {
        let node = SubgraphNode::new(subgraph, config);
        self.graph.add_node(id.into(), NodeKind::Subgraph(Arc::new(node)));
        self
    }

    /// Add a plain edge
    ///
    /// Several plain edges from one source run their targets in parallel;
    /// the targets must all lead to the same join node.
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Add a conditional edge whose router returns a routing label
    ///
    /// `mappings` maps each label to its target node (or `END`). A label
    /// outside the mapping fails the run with [`GraphError::Routing`].
    pub fn add_conditional_edges<F, Fut, I, K, V>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        mappings: I,
    ) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<NodeId>,
    {
        let edge: EdgeAction = action(move |state, config| {
            let label = router(state, config);
            async move { label.await.map(Command::goto) }
        });
        self.add_conditional_edge_action(from, edge, mappings)
    }

    /// Add a conditional edge whose router returns a [`Command`]
    ///
    /// The command's update is merged into state along with the transition.
    pub fn add_command_edges<F, Fut, I, K, V>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        mappings: I,
    ) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Command>> + Send + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<NodeId>,
    {
        self.add_conditional_edge_action(from, action(router), mappings)
    }

    pub fn add_conditional_edge_action<I, K, V>(
        &mut self,
        from: impl Into<NodeId>,
        router: EdgeAction,
        mappings: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<NodeId>,
    {
        let mappings = mappings
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.graph
            .add_conditional_edge(from.into(), ConditionalEdge { router, mappings });
        self
    }

    pub fn add_node_before_hook(&mut self, hook: Arc<dyn BeforeHook>) -> &mut Self {
        self.node_hooks.add_before(hook);
        self
    }

    pub fn add_node_before_hook_for(
        &mut self,
        node: impl Into<NodeId>,
        hook: Arc<dyn BeforeHook>,
    ) -> &mut Self {
        self.node_hooks.add_before_for(node, hook);
        self
    }

    pub fn add_node_after_hook(&mut self, hook: Arc<dyn AfterHook<Delta>>) -> &mut Self {
        self.node_hooks.add_after(hook);
        self
    }

    pub fn add_node_after_hook_for(
        &mut self,
        node: impl Into<NodeId>,
        hook: Arc<dyn AfterHook<Delta>>,
    ) -> &mut Self {
        self.node_hooks.add_after_for(node, hook);
        self
    }

    pub fn add_node_wrap_hook(&mut self, hook: Arc<dyn WrapHook<Delta>>) -> &mut Self {
        self.node_hooks.add_wrap(hook);
        self
    }

    pub fn add_node_wrap_hook_for(
        &mut self,
        node: impl Into<NodeId>,
        hook: Arc<dyn WrapHook<Delta>>,
    ) -> &mut Self {
        self.node_hooks.add_wrap_for(node, hook);
        self
    }

    pub fn add_edge_before_hook(&mut self, hook: Arc<dyn BeforeHook>) -> &mut Self {
        self.edge_hooks.add_before(hook);
        self
    }

    /// Hook the conditional edge leaving `source`
    pub fn add_edge_before_hook_for(
        &mut self,
        source: impl Into<NodeId>,
        hook: Arc<dyn BeforeHook>,
    ) -> &mut Self {
        self.edge_hooks.add_before_for(source, hook);
        self
    }

    pub fn add_edge_after_hook(&mut self, hook: Arc<dyn AfterHook<Command>>) -> &mut Self {
        self.edge_hooks.add_after(hook);
        self
    }

    pub fn add_edge_after_hook_for(
        &mut self,
        source: impl Into<NodeId>,
        hook: Arc<dyn AfterHook<Command>>,
    ) -> &mut Self {
        self.edge_hooks.add_after_for(source, hook);
        self
    }

    pub fn add_edge_wrap_hook(&mut self, hook: Arc<dyn WrapHook<Command>>) -> &mut Self {
        self.edge_hooks.add_wrap(hook);
        self
    }

    pub fn add_edge_wrap_hook_for(
        &mut self,
        source: impl Into<NodeId>,
        hook: Arc<dyn WrapHook<Command>>,
    ) -> &mut Self {
        self.edge_hooks.add_wrap_for(source, hook);
        self
    }

    /// Compile with the default configuration (no saver, no interrupts)
    pub fn compile(self) -> Result<CompiledGraph> {
        self.compile_with(CompileConfig::default())
    }

    /// Validate and freeze the graph
    ///
    /// # Errors
    ///
    /// [`GraphError::Validation`] when:
    /// - an edge references an undeclared node, or `__start__` has no edge
    /// - a node is declared twice, unreachable, or has no outgoing edge
    /// - a fan-out's branches do not share a single join node
    /// - a node hook names an undeclared node, or an edge hook names a node
    ///   without a conditional edge
    /// - an interrupt names an undeclared node or a parallel branch
    pub fn compile_with(self, config: CompileConfig) -> Result<CompiledGraph> {
        self.graph.validate()?;

        let parallel = self.graph.parallel_edges();
        let branches: HashSet<&str> = parallel
            .iter()
            .flat_map(|edge| edge.branches.iter().map(String::as_str))
            .collect();

        for id in self.node_hooks.scoped_ids() {
            if !self.graph.contains_node(id) {
                return Err(GraphError::Validation(format!(
                    "node hook registered for '{id}', which is not a declared node"
                )));
            }
        }

        let conditional: HashSet<&NodeId> = self.graph.conditional_sources().collect();
        for id in self.edge_hooks.scoped_ids() {
            if !conditional.contains(id) {
                return Err(GraphError::Validation(format!(
                    "edge hook registered for '{id}', which has no conditional edge"
                )));
            }
        }

        for id in config.interrupts.named_nodes() {
            if !self.graph.contains_node(id) {
                return Err(GraphError::Validation(format!(
                    "interrupt configured for '{id}', which is not a declared node"
                )));
            }
            if branches.contains(id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "interrupt configured for parallel branch '{id}'"
                )));
            }
        }

        if config.max_iterations == 0 {
            return Err(GraphError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        Ok(CompiledGraph::from_parts(
            self.graph,
            parallel,
            self.schema,
            self.node_hooks,
            self.edge_hooks,
            config,
        ))
    }
}

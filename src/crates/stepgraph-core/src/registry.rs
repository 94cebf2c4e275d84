//! Named actions for declaratively defined graphs
//!
//! A graph loaded from YAML refers to its node actions, routers, reducers
//! and subgraphs by name. [`ActionRegistry`] is the table those names are
//! resolved against when the definition is built into a
//! [`StateGraph`](crate::StateGraph).
//!
//! ```rust
//! use stepgraph_core::registry::ActionRegistry;
//! use stepgraph_core::Delta;
//!
//! let mut registry = ActionRegistry::new();
//! registry
//!     .register_node("greet", |_state, _config| async {
//!         Ok(Delta::new().set("greeting", "hello"))
//!     })
//!     .register_router("always_done", |_state, _config| async {
//!         Ok("done".to_string())
//!     });
//!
//! assert!(registry.has_node("greet"));
//! assert!(registry.node("missing").is_err());
//! ```

use crate::command::Command;
use crate::compiled::CompiledGraph;
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::hook::{action, EdgeAction, NodeAction};
use crate::state::{reducer_by_name, Delta, Reducer, State};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Name → callable table used when building graphs from definitions
#[derive(Default, Clone)]
pub struct ActionRegistry {
    nodes: HashMap<String, NodeAction>,
    routers: HashMap<String, EdgeAction>,
    subgraphs: HashMap<String, CompiledGraph>,
    reducers: HashMap<String, Arc<dyn Reducer>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node action
    pub fn register_node<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Delta>> + Send + 'static,
    {
        self.nodes.insert(name.into(), action(f));
        self
    }

    /// Register a router returning a routing label
    pub fn register_router<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let router: EdgeAction = action(move |state, config| {
            let label = f(state, config);
            async move { label.await.map(Command::goto) }
        });
        self.routers.insert(name.into(), router);
        self
    }

    /// Register a router returning a full [`Command`]
    pub fn register_command_router<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Command>> + Send + 'static,
    {
        self.routers.insert(name.into(), action(f));
        self
    }

    pub fn register_subgraph(&mut self, name: impl Into<String>, graph: CompiledGraph) -> &mut Self {
        self.subgraphs.insert(name.into(), graph);
        self
    }

    /// Register a reducer; shadows a built-in reducer of the same name
    pub fn register_reducer(&mut self, name: impl Into<String>, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducers.insert(name.into(), reducer);
        self
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Result<NodeAction> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| missing("node action", name))
    }

    pub fn router(&self, name: &str) -> Result<EdgeAction> {
        self.routers
            .get(name)
            .cloned()
            .ok_or_else(|| missing("router", name))
    }

    pub fn subgraph(&self, name: &str) -> Result<CompiledGraph> {
        self.subgraphs
            .get(name)
            .cloned()
            .ok_or_else(|| missing("subgraph", name))
    }

    /// Registered reducer, falling back to the built-in ones
    /// (`overwrite`, `append`, `merge`, `sum`)
    pub fn reducer(&self, name: &str) -> Result<Arc<dyn Reducer>> {
        self.reducers
            .get(name)
            .cloned()
            .or_else(|| reducer_by_name(name))
            .ok_or_else(|| missing("reducer", name))
    }
}

fn missing(kind: &str, name: &str) -> GraphError {
    GraphError::Configuration(format!("no {kind} registered as '{name}'"))
}

fn sorted<V>(map: &HashMap<String, V>) -> Vec<&String> {
    let mut names: Vec<&String> = map.keys().collect();
    names.sort();
    names
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("nodes", &sorted(&self.nodes))
            .field("routers", &sorted(&self.routers))
            .field("subgraphs", &sorted(&self.subgraphs))
            .field("reducers", &sorted(&self.reducers))
            .finish()
    }
}

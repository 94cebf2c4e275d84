//! YAML-based graph definitions
//!
//! A [`YamlGraphDef`] declares channels, nodes, edges and compile options;
//! node actions, routers, custom reducers and subgraphs are referenced by
//! name and resolved against an [`ActionRegistry`] when the definition is
//! built.
//!
//! ```yaml
//! name: review_flow
//! graph_id: review_flow
//!
//! channels:
//!   messages:
//!     reducer: append
//!     default: []
//!
//! nodes:
//!   - id: draft
//!     action: write_draft
//!   - id: review
//!     subgraph: reviewer
//!     output_keys: [verdict]
//!
//! edges:
//!   - from: __start__
//!     to: draft
//!   - from: draft
//!     to: review
//!   - from: review
//!     router: check_verdict
//!     targets:
//!       revise: draft
//!       accept: __end__
//!
//! interrupt_before: [review]
//! max_iterations: 10
//! ```

use crate::builder::StateGraph;
use crate::compiled::CompiledGraph;
use crate::config::CompileConfig;
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, END, START};
use crate::registry::ActionRegistry;
use crate::state::{Channel, Schema};
use crate::subgraph::SubgraphConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use stepgraph_checkpoint::CheckpointSaver;

/// Top-level YAML graph definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlGraphDef {
    /// Graph name
    pub name: String,

    /// Graph description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// State channel definitions
    #[serde(default)]
    pub channels: BTreeMap<String, YamlChannelDef>,

    /// Node definitions, in declaration order
    pub nodes: Vec<YamlNodeDef>,

    /// Edge definitions
    pub edges: Vec<YamlEdgeDef>,

    /// Interrupts, graph id and run limits
    #[serde(flatten)]
    pub compile: CompileConfig,
}

/// Channel definition in YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YamlChannelDef {
    /// Reducer name: a built-in (`overwrite`, `append`, `merge`, `sum`) or
    /// one registered on the [`ActionRegistry`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reducer: Option<String>,

    /// Value of the key in the initial state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Node definition in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlNodeDef {
    pub id: NodeId,

    /// Registered node action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Registered subgraph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<String>,

    /// Keys passed into the subgraph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_keys: Option<Vec<String>>,

    /// Keys returned from the subgraph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_keys: Option<Vec<String>>,
}

/// Edge definition in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlEdgeDef {
    /// Direct edge
    Direct { from: NodeId, to: NodeId },

    /// Conditional edge: routing label to target node
    Conditional {
        from: NodeId,
        router: String,
        targets: BTreeMap<String, NodeId>,
    },
}

impl YamlEdgeDef {
    pub fn from_node(&self) -> &str {
        match self {
            Self::Direct { from, .. } | Self::Conditional { from, .. } => from,
        }
    }
}

impl YamlGraphDef {
    /// Load graph definition from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse graph definition from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the definition's references
    ///
    /// Structural rules (reachability, fan-out shape) are left to
    /// [`StateGraph::compile`]; this only checks what the YAML itself can
    /// get wrong.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return invalid(format!("duplicate node id '{}'", node.id));
            }
            match (&node.action, &node.subgraph) {
                (Some(_), None) => {
                    if node.input_keys.is_some() || node.output_keys.is_some() {
                        return invalid(format!(
                            "node '{}' declares subgraph keys but is not a subgraph",
                            node.id
                        ));
                    }
                }
                (None, Some(_)) => {}
                _ => {
                    return invalid(format!(
                        "node '{}' must declare exactly one of 'action' or 'subgraph'",
                        node.id
                    ))
                }
            }
        }

        let known = |id: &str, allowed: &str| id == allowed || ids.contains(id);
        for edge in &self.edges {
            let from = edge.from_node();
            if !known(from, START) {
                return invalid(format!("edge source '{from}' does not exist"));
            }
            let targets: Vec<&NodeId> = match edge {
                YamlEdgeDef::Direct { to, .. } => vec![to],
                YamlEdgeDef::Conditional { targets, .. } => targets.values().collect(),
            };
            for to in targets {
                if !known(to, END) {
                    return invalid(format!("edge target '{to}' does not exist"));
                }
            }
        }
        Ok(())
    }

    /// Schema of the declared channels
    pub fn schema(&self, registry: &ActionRegistry) -> Result<Schema> {
        let mut schema = Schema::new();
        for (key, def) in &self.channels {
            let mut channel = Channel::new();
            if let Some(name) = &def.reducer {
                channel = channel.with_shared_reducer(registry.reducer(name)?);
            }
            if let Some(value) = &def.default {
                channel = channel.with_default_value(value.clone());
            }
            schema = schema.with_channel(key.clone(), channel);
        }
        Ok(schema)
    }

    /// Resolve every name against `registry` and build the graph
    pub fn build(&self, registry: &ActionRegistry) -> Result<StateGraph> {
        self.validate()?;

        let mut graph = StateGraph::new(self.schema(registry)?);
        for node in &self.nodes {
            if let Some(action) = &node.action {
                graph.add_node_action(node.id.clone(), registry.node(action)?);
            } else if let Some(subgraph) = &node.subgraph {
                let config = SubgraphConfig {
                    input_keys: node.input_keys.clone(),
                    output_keys: node.output_keys.clone(),
                };
                graph.add_subgraph_with(node.id.clone(), registry.subgraph(subgraph)?, config);
            }
        }

        for edge in &self.edges {
            match edge {
                YamlEdgeDef::Direct { from, to } => {
                    graph.add_edge(from.clone(), to.clone());
                }
                YamlEdgeDef::Conditional {
                    from,
                    router,
                    targets,
                } => {
                    graph.add_conditional_edge_action(from.clone(), registry.router(router)?, targets.clone());
                }
            }
        }
        Ok(graph)
    }

    /// Compile options declared in the definition
    pub fn compile_config(&self) -> CompileConfig {
        self.compile.clone()
    }

    /// Build and compile, optionally with a checkpoint saver
    pub fn compile(
        &self,
        registry: &ActionRegistry,
        saver: Option<Arc<dyn CheckpointSaver>>,
    ) -> Result<CompiledGraph> {
        let mut config = self.compile_config();
        config.checkpoint_saver = saver;
        self.build(registry)?.compile_with(config)
    }

    /// Convert to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn invalid(message: String) -> Result<()> {
    Err(GraphError::Validation(message))
}

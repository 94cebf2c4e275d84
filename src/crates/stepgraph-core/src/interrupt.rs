//! Interrupts and suspension metadata
//!
//! A run suspends instead of completing when:
//!
//! - a node listed in [`InterruptConfig::interrupt_before`] is about to run
//! - a node listed in [`InterruptConfig::interrupt_after`] has just run
//! - a node action asks for it by returning [`GraphError::Interrupted`]
//! - a subgraph node's nested run suspended
//!
//! Each case yields an [`InterruptionMetadata`]. The thread's latest
//! checkpoint always designates the node to run on resume, so resuming is
//! a matter of invoking the graph again with `GraphInput::resume()` on the
//! same thread.
//!
//! ```rust
//! use stepgraph_core::InterruptConfig;
//!
//! let config = InterruptConfig::new()
//!     .with_interrupt_before(vec!["review".to_string()])
//!     .with_interrupt_after(vec!["draft".to_string()]);
//!
//! assert!(config.should_interrupt_before("review"));
//! assert!(config.should_interrupt_after("draft"));
//! assert!(!config.should_interrupt_after("review"));
//! ```
//!
//! [`GraphError::Interrupted`]: crate::error::GraphError::Interrupted

use crate::graph::NodeId;
use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Checkpoint metadata key naming the subgraph node a run suspended in
///
/// Only a resume from a checkpoint carrying this mark re-enters the
/// subgraph's unfinished history; otherwise the subgraph starts afresh.
pub const SUSPENDED_SUBGRAPH: &str = "suspended_subgraph";

/// Static suspension points of a compiled graph
///
/// Synthetic parallel nodes are never suspended at, whatever the lists
/// or flags say.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Suspend just before these nodes run
    pub interrupt_before: Vec<NodeId>,

    /// Suspend once these nodes have run and been checkpointed
    pub interrupt_after: Vec<NodeId>,

    /// Treat every node as listed in `interrupt_before`
    pub interrupt_before_all: bool,

    /// Treat every node as listed in `interrupt_after`
    pub interrupt_after_all: bool,
}

impl InterruptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the `interrupt_before` list
    pub fn with_interrupt_before(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_before = nodes;
        self
    }

    /// Replace the `interrupt_after` list
    pub fn with_interrupt_after(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_after = nodes;
        self
    }

    pub fn with_interrupt_before_all(mut self) -> Self {
        self.interrupt_before_all = true;
        self
    }

    pub fn with_interrupt_after_all(mut self) -> Self {
        self.interrupt_after_all = true;
        self
    }

    /// True when `node` is a before-suspension point
    ///
    /// The runner skips this check for the node a run resumes at.
    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before_all || self.interrupt_before.iter().any(|n| n == node)
    }

    /// True when `node` is an after-suspension point
    pub fn should_interrupt_after(&self, node: &str) -> bool {
        self.interrupt_after_all || self.interrupt_after.iter().any(|n| n == node)
    }

    /// Nodes named explicitly in either list
    pub(crate) fn named_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.interrupt_before.iter().chain(self.interrupt_after.iter())
    }
}

/// Why a run suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptKind {
    /// Before a node listed in `interrupt_before`
    Before,
    /// After a node listed in `interrupt_after`
    After,
    /// A node action requested it
    Node,
    /// A subgraph node's nested run suspended
    Subgraph,
}

/// Describes a suspended run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptionMetadata {
    /// Node the run will resume at
    pub node_id: NodeId,

    pub kind: InterruptKind,

    /// State at the suspension point
    pub state: State,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Suspension of the nested run, for [`InterruptKind::Subgraph`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<Box<InterruptionMetadata>>,
}

impl InterruptionMetadata {
    pub fn new(node_id: impl Into<NodeId>, kind: InterruptKind, state: State) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            state,
            metadata: Map::new(),
            subgraph: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_subgraph(mut self, nested: InterruptionMetadata) -> Self {
        self.subgraph = Some(Box::new(nested));
        self
    }

    /// The innermost suspension of a nested chain
    pub fn innermost(&self) -> &InterruptionMetadata {
        let mut current = self;
        while let Some(nested) = &current.subgraph {
            current = nested;
        }
        current
    }
}

/// A nested graph suspended inside a parent node
///
/// Carried by `GraphError::SubgraphInterrupted` when a node action runs a
/// subgraph by hand and hands the suspension back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphInterruption {
    /// Parent node that ran the subgraph
    pub parent_node: NodeId,

    /// Suspension reported by the subgraph
    pub interruption: InterruptionMetadata,
}

impl SubgraphInterruption {
    pub fn new(parent_node: impl Into<NodeId>, interruption: InterruptionMetadata) -> Self {
        Self {
            parent_node: parent_node.into(),
            interruption,
        }
    }

    /// Node inside the subgraph the nested run will resume at
    pub fn resume_node(&self) -> &str {
        &self.interruption.node_id
    }

    /// State of the subgraph at the suspension point
    pub fn state(&self) -> &State {
        &self.interruption.state
    }
}

//! Error types for graph construction and execution
//!
//! ```text
//! GraphError
//! ├── Validation          - structural graph defects, raised by compile()
//! ├── Routing             - a conditional edge chose an undeclared target
//! ├── NodeExecution       - a node action failed
//! ├── Interrupted         - a node action asks to suspend the run
//! ├── SubgraphInterrupted - a nested graph suspended inside a node action
//! ├── Execution           - run-level failures (iteration limit, bad resume)
//! ├── State / Path        - channel model and graph path errors
//! ├── Checkpoint          - persistence errors
//! ├── Serialization/Yaml  - JSON/YAML errors
//! └── Configuration       - invalid configuration
//! ```
//!
//! `Interrupted` and `SubgraphInterrupted` are control flow rather than
//! failures: the execution loop turns an `Interrupted` returned by a node
//! action into a suspension, and a built-in subgraph node turns its nested
//! suspension into a suspension of the parent.
//!
//! ```rust
//! use stepgraph_core::{GraphError, StateGraph, Schema};
//!
//! let mut graph = StateGraph::new(Schema::new());
//! graph.add_edge("__start__", "missing");
//!
//! match graph.compile() {
//!     Err(GraphError::Validation(msg)) => assert!(msg.contains("missing")),
//!     other => panic!("expected a validation error, got {other:?}"),
//! }
//! ```

use crate::interrupt::SubgraphInterruption;
use crate::path::PathError;
use crate::state::StateError;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur during graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure is invalid
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A conditional edge routed to a target outside its declared set
    #[error("Node '{node}' routed to undeclared target '{target}'")]
    Routing { node: String, target: String },

    /// Node execution failed
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// General execution error
    #[error("Execution failed: {0}")]
    Execution(String),

    /// A node action asks to suspend the run at this node
    #[error("Graph execution interrupted at node '{node}': {reason}")]
    Interrupted { node: String, reason: String },

    /// A nested graph suspended inside a node action
    #[error("Subgraph run by node '{}' suspended at '{}'", .0.parent_node, .0.resume_node())]
    SubgraphInterrupted(Box<SubgraphInterruption>),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Graph path error: {0}")]
    Path(#[from] PathError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] stepgraph_checkpoint::CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    /// Create a node execution error
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create an in-band interrupt request
    pub fn interrupted(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn routing(node: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            target: target.into(),
        }
    }

    pub fn subgraph_interrupted(interruption: SubgraphInterruption) -> Self {
        Self::SubgraphInterrupted(Box::new(interruption))
    }

    /// The nested suspension, if this error carries one
    pub fn subgraph_interruption(&self) -> Option<&SubgraphInterruption> {
        match self {
            Self::SubgraphInterrupted(interruption) => Some(interruption),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{InterruptKind, InterruptionMetadata};
    use crate::state::State;

    #[test]
    fn test_error_messages() {
        let err = GraphError::routing("router", "nowhere");
        assert_eq!(err.to_string(), "Node 'router' routed to undeclared target 'nowhere'");

        let err = GraphError::node_execution("fetch", "timeout");
        assert_eq!(err.to_string(), "Node 'fetch' execution failed: timeout");
    }

    #[test]
    fn test_subgraph_interruption_accessor() {
        let meta = InterruptionMetadata::new("inner", InterruptKind::Before, State::new());
        let err = GraphError::subgraph_interrupted(SubgraphInterruption::new("outer", meta));

        let interruption = err.subgraph_interruption().unwrap();
        assert_eq!(interruption.parent_node, "outer");
        assert_eq!(interruption.resume_node(), "inner");
        assert!(err.to_string().contains("'outer'"));
        assert!(GraphError::Custom("x".into()).subgraph_interruption().is_none());
    }

    #[test]
    fn test_from_state_error() {
        let err: GraphError = StateError::InvalidState("bad".into()).into();
        assert!(matches!(err, GraphError::State(_)));
    }
}

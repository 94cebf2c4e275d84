//! Checkpoint data types
//!
//! A [`Checkpoint`] is a durable snapshot of one execution step of a graph:
//! the node that just ran, the node that will run next on resume, and the
//! full state produced by the step.
//!
//! Checkpoints are grouped into per-thread histories. A history is addressed
//! by a [`CheckpointConfig`], which carries the thread id, an optional
//! namespace (nested graphs keep their own history under the same thread)
//! and, optionally, the id of one specific checkpoint.
//!
//! # Example
//!
//! ```rust
//! use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource};
//! use serde_json::{json, Map};
//!
//! let mut state = Map::new();
//! state.insert("messages".to_string(), json!(["a", "b"]));
//!
//! let checkpoint = Checkpoint::new("node_b", "node_c", state)
//!     .with_metadata(CheckpointMetadata::new().with_source(CheckpointSource::Loop).with_step(2));
//!
//! assert_eq!(checkpoint.next_node_id, "node_c");
//!
//! let config = CheckpointConfig::new()
//!     .with_thread_id("thread-1".to_string())
//!     .with_checkpoint_id(checkpoint.id.clone());
//! assert_eq!(config.thread_id.as_deref(), Some("thread-1"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a checkpoint
pub type CheckpointId = String;

/// Raw state data stored in a checkpoint
pub type StateData = serde_json::Map<String, serde_json::Value>;

/// Where a checkpoint came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from the input of a fresh run
    Input,
    /// Checkpoint created by the execution loop after a step
    Loop,
    /// Checkpoint created from a manual state update
    Update,
    /// Checkpoint created as a copy of another checkpoint
    Fork,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the input checkpoint, 0.. for loop checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    /// Add extra metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Snapshot of a single execution step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Unique id of this checkpoint
    pub id: CheckpointId,

    /// Node that produced this checkpoint
    pub node_id: String,

    /// Node to execute when resuming from this checkpoint
    pub next_node_id: String,

    /// Full state after the step
    pub state: StateData,

    /// Creation time
    pub ts: DateTime<Utc>,

    /// Metadata
    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create a checkpoint with a fresh id
    pub fn new(
        node_id: impl Into<String>,
        next_node_id: impl Into<String>,
        state: StateData,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            next_node_id: next_node_id.into(),
            state,
            ts: Utc::now(),
            metadata: CheckpointMetadata::default(),
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Copy this checkpoint under a new id, marked as a fork
    pub fn fork(&self) -> Self {
        let mut forked = self.clone();
        forked.id = Uuid::new_v4().to_string();
        forked.ts = Utc::now();
        forked.metadata.source = Some(CheckpointSource::Fork);
        forked
    }
}

/// Address of a checkpoint history, or of one checkpoint inside it
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointConfig {
    /// Thread ID for grouping related checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Specific checkpoint ID to retrieve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Checkpoint namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    /// Additional configuration
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointConfig {
    /// Create a new checkpoint configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread ID
    pub fn with_thread_id(mut self, thread_id: String) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: CheckpointId) -> Self {
        self.checkpoint_id = Some(checkpoint_id);
        self
    }

    /// Set the checkpoint namespace
    pub fn with_checkpoint_ns(mut self, checkpoint_ns: String) -> Self {
        self.checkpoint_ns = Some(checkpoint_ns);
        self
    }

    /// The same history address without a specific checkpoint id
    pub fn without_checkpoint_id(&self) -> Self {
        Self {
            checkpoint_id: None,
            ..self.clone()
        }
    }
}

/// Checkpoints of a released thread history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    /// Thread the history belonged to
    pub thread_id: String,

    /// Released checkpoints, most recent first
    pub checkpoints: Vec<Checkpoint>,
}

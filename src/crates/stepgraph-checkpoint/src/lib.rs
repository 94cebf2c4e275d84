//! # stepgraph-checkpoint - Checkpoint persistence for graph executions
//!
//! This crate defines what a checkpoint is, the [`CheckpointSaver`] contract
//! that storage backends implement, and [`InMemoryCheckpointSaver`], the
//! reference in-memory backend.
//!
//! The execution engine in `stepgraph-core` writes one checkpoint per step.
//! A checkpoint records the node that ran, the node to run next and the full
//! state, which is all a suspended run needs to continue later.
//!
//! ## Histories
//!
//! Checkpoints are kept in histories partitioned by thread id and namespace.
//! The root graph of a run writes to the empty namespace; a nested graph
//! writes to a namespace equal to its graph path, so a parent and its
//! subgraphs can share one saver without mixing histories.
//!
//! ```rust
//! use stepgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointSaver, InMemoryCheckpointSaver, StateData};
//!
//! # #[tokio::main]
//! # async fn main() -> stepgraph_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! let root = CheckpointConfig::new().with_thread_id("t1".to_string());
//! let nested = root.clone().with_checkpoint_ns("parent/child".to_string());
//!
//! saver.insert(&root, Checkpoint::new("__start__", "child", StateData::new())).await?;
//! saver.insert(&nested, Checkpoint::new("__start__", "inner", StateData::new())).await?;
//!
//! assert_eq!(saver.load(&root).await?.len(), 1);
//! assert_eq!(saver.load(&nested).await?.len(), 1);
//!
//! let tag = saver.release(&root).await?;
//! assert_eq!(tag.checkpoints.len(), 1);
//! assert!(saver.load(&nested).await?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointSource, StateData,
    Tag,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};

//! # stepgraph-core - Stateful, Resumable Workflow Graphs
//!
//! Build workflows as directed graphs of async nodes that share a keyed
//! state, run them one step at a time, checkpoint after every step, and
//! suspend and resume them across process boundaries.
//!
//! ## Overview
//!
//! `stepgraph-core` provides:
//!
//! - **Channel-based state** - a key/value [`State`] whose keys merge through per-key reducers
//! - **Deterministic stepping** - exactly one node (or one parallel group) runs per step
//! - **Checkpoint/resume** - every step is persisted through a [`CheckpointSaver`]
//! - **Human-in-the-loop** - static interrupts before/after nodes and in-band suspension
//! - **Conditional routing** - routers return a label or a full [`Command`]
//! - **Streaming** - a lazy, cancellable [`GraphStream`] of node outputs and custom chunks
//! - **Nested graphs** - compiled graphs used as nodes, with isolated checkpoint namespaces
//! - **Hooks** - before/wrap/after interception of nodes and conditional edges
//! - **Declarative graphs** - YAML definitions resolved against an [`ActionRegistry`]
//!
//! ## Core Concepts
//!
//! ### 1. State, channels and deltas
//!
//! A [`Schema`] maps keys to [`Channel`]s. A node never mutates the state it
//! receives; it returns a [`Delta`] that is merged into the current state
//! with each key's reducer. Keys without a channel are overwritten.
//!
//! ### 2. StateGraph and CompiledGraph
//!
//! [`StateGraph`] collects nodes and edges. [`StateGraph::compile`] validates
//! the structure once and produces an immutable, cheaply cloneable
//! [`CompiledGraph`] that can run any number of threads concurrently.
//!
//! ### 3. Threads and checkpoints
//!
//! A run is identified by the thread id of its [`RunConfig`]. With a saver
//! configured, a checkpoint is written after each step; resuming a thread
//! continues from its latest checkpoint, and [`CompiledGraph::update_state`]
//! edits that history between runs.
//!
//! ### 4. Interrupts
//!
//! ```text
//! interrupt_before  ->  suspended before the node runs; resume runs it
//! interrupt_after   ->  suspended after the node's checkpoint; resume continues at next
//! in-band           ->  the node returns GraphError::Interrupted; resume re-runs it
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use stepgraph_core::{
//!     Channel, CompileConfig, Delta, GraphInput, InMemoryCheckpointSaver, RunConfig, Schema,
//!     StateGraph, END, START,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> stepgraph_core::Result<()> {
//! let schema = Schema::new().with_channel("steps", Channel::appender());
//!
//! let mut graph = StateGraph::new(schema);
//! graph
//!     .add_node("plan", |_state, _config| async { Ok(Delta::new().set("steps", "plan")) })
//!     .add_node("act", |_state, _config| async { Ok(Delta::new().set("steps", "act")) })
//!     .add_edge(START, "plan")
//!     .add_edge("plan", "act")
//!     .add_edge("act", END);
//!
//! let compiled = graph.compile_with(
//!     CompileConfig::new()
//!         .with_checkpoint_saver(Arc::new(InMemoryCheckpointSaver::new()))
//!         .interrupt_before(vec!["act".to_string()]),
//! )?;
//!
//! let config = RunConfig::new().with_thread_id("thread-1");
//! let first = compiled.invoke(GraphInput::args(Delta::new()), config.clone()).await?;
//! assert!(first.is_suspended());
//!
//! let done = compiled.invoke(GraphInput::resume(), config).await?;
//! let steps = done.state().and_then(|s| s.value::<Vec<String>>("steps"));
//! assert_eq!(steps, Some(vec!["plan".to_string(), "act".to_string()]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`state`] - state, deltas, reducers, channels and schemas
//! - [`graph`] / [`builder`] - graph structure and the [`StateGraph`] builder
//! - [`compiled`] - execution, streaming and the state API
//! - [`hook`] - node and edge hooks
//! - [`subgraph`] - compiled graphs as nodes
//! - [`stream`] - events, results and snapshots
//! - [`yaml`] / [`registry`] - declarative graph definitions
//!
//! ## See Also
//!
//! - [`stepgraph_checkpoint`] - checkpoint model, saver trait and the in-memory saver

pub mod builder;
pub mod command;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod hook;
pub mod interrupt;
pub mod path;
pub mod registry;
pub mod state;
pub mod stream;
pub mod subgraph;
pub mod yaml;

// Re-export main types
pub use builder::StateGraph;
pub use command::Command;
pub use compiled::{CompiledGraph, GraphInput};
pub use config::{CompileConfig, RunConfig, StreamMode, DEFAULT_MAX_ITERATIONS, DEFAULT_THREAD_ID};
pub use error::{GraphError, Result};
pub use graph::{NodeId, END, START};
pub use interrupt::{InterruptConfig, InterruptKind, InterruptionMetadata, SubgraphInterruption};
pub use path::GraphPath;
pub use registry::ActionRegistry;
pub use state::{
    AppendReducer, Channel, Delta, MergeReducer, OverwriteReducer, Reducer, Schema, State,
    StateError, SumReducer, Update,
};
pub use stream::{
    GraphEvent, GraphResult, GraphStream, NodeOutput, StateSnapshot, StreamWriter,
    StreamingOutput,
};
pub use subgraph::{SubgraphConfig, SubgraphNode};
pub use yaml::YamlGraphDef;

pub use stepgraph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointId, CheckpointMetadata,
    CheckpointSaver, CheckpointSource, InMemoryCheckpointSaver, Tag,
};

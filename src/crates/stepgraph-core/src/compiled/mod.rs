//! CompiledGraph execution engine for running stateful workflows
//!
//! Once a graph is built using [`StateGraph`](crate::StateGraph) and
//! compiled, it becomes a [`CompiledGraph`]: an immutable, cheaply cloned
//! runtime that can execute any number of runs.
//!
//! # Overview
//!
//! A run executes one node per step. After each step the full state is
//! checkpointed (when a saver is configured) together with the node to run
//! next, which makes every run:
//!
//! - **Resumable** - suspended runs continue from the thread's latest checkpoint
//! - **Inspectable** - [`CompiledGraph::get_state`] and [`CompiledGraph::get_state_history`]
//! - **Editable** - [`CompiledGraph::update_state`] patches the state between runs
//! - **Observable** - [`CompiledGraph::stream`] yields every step as it happens
//!
//! # Execution Modes
//!
//! ## Invoke - One-Shot Execution
//!
//! [`CompiledGraph::invoke`] drives the run to its end and returns the
//! [`GraphResult`](crate::GraphResult).
//!
//! ## Stream - Real-Time Updates
//!
//! [`CompiledGraph::stream`] returns a [`GraphStream`](crate::GraphStream)
//! of node outputs (or snapshots) and partial results emitted by nodes.

mod execution;
mod graph;
mod runner;
mod state;
mod types;

pub use graph::CompiledGraph;
pub use types::GraphInput;

//! Streaming graph execution
//!
//! [`CompiledGraph::stream`] returns a [`GraphStream`]: a lazy stream of
//! [`GraphEvent`]s that drives the run as it is polled. Each executed step
//! produces one event:
//!
//! | Event | When |
//! |---|---|
//! | [`GraphEvent::Node`] | after a step, in [`StreamMode::Values`] |
//! | [`GraphEvent::Snapshot`] | after a step, in [`StreamMode::Snapshots`] |
//! | [`GraphEvent::Streaming`] | a node emitted a partial result via [`RunConfig::emit`] |
//!
//! Streaming chunks of a node always arrive before that node's output.
//! Events of nested graphs are forwarded with their [`GraphPath`], so a
//! consumer of the root stream sees the whole tree.
//!
//! When the stream ends, [`GraphStream::take_result`] (or
//! [`GraphStream::finish`]) yields how the run ended: completed, suspended
//! at an interrupt, or cancelled.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use stepgraph_core::{CompiledGraph, GraphEvent, GraphInput, RunConfig};
//!
//! # async fn run(graph: CompiledGraph) -> stepgraph_core::Result<()> {
//! let mut stream = graph.stream(GraphInput::args(Default::default()), RunConfig::new());
//! while let Some(event) = stream.next().await {
//!     match event {
//!         GraphEvent::Streaming(chunk) => print!("{}", chunk.chunk),
//!         GraphEvent::Node(output) => println!("\n[{}] done", output.node),
//!         GraphEvent::Snapshot(_) => {}
//!     }
//! }
//! let result = stream.take_result().expect("stream drained")?;
//! println!("{:?}", result.state());
//! # Ok(())
//! # }
//! ```
//!
//! [`CompiledGraph::stream`]: crate::compiled::CompiledGraph::stream
//! [`StreamMode::Values`]: crate::config::StreamMode::Values
//! [`StreamMode::Snapshots`]: crate::config::StreamMode::Snapshots

use crate::config::RunConfig;
use crate::error::Result;
use crate::graph::NodeId;
use crate::interrupt::InterruptionMetadata;
use crate::path::GraphPath;
use crate::state::State;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use stepgraph_checkpoint::CheckpointId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// State after one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub node: NodeId,
    pub state: State,
    /// Graph the node belongs to; empty for the root graph
    #[serde(default)]
    pub path: GraphPath,
}

impl NodeOutput {
    pub fn new(node: impl Into<NodeId>, state: State, path: GraphPath) -> Self {
        Self {
            node: node.into(),
            state,
            path,
        }
    }

    pub fn is_end(&self) -> bool {
        self.node == crate::graph::END
    }
}

/// Partial result emitted by a running node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingOutput {
    pub node: NodeId,
    pub chunk: Value,
    #[serde(default)]
    pub path: GraphPath,
}

/// Node output enriched with the checkpoint written for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Node that produced the checkpoint
    pub node: NodeId,
    /// Node the run resumes at
    pub next: NodeId,
    pub state: State,
    pub thread_id: String,
    pub checkpoint_id: Option<CheckpointId>,
    #[serde(default)]
    pub path: GraphPath,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StateSnapshot {
    /// Run config addressing this snapshot's checkpoint
    pub fn run_config(&self) -> RunConfig {
        let config = RunConfig::new()
            .with_thread_id(self.thread_id.clone())
            .with_graph_path(self.path.clone());
        match &self.checkpoint_id {
            Some(id) => config.with_checkpoint_id(id.clone()),
            None => config,
        }
    }
}

/// Item of a [`GraphStream`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    Node(NodeOutput),
    Streaming(StreamingOutput),
    Snapshot(StateSnapshot),
}

impl GraphEvent {
    pub fn node(&self) -> &str {
        match self {
            Self::Node(output) => &output.node,
            Self::Streaming(output) => &output.node,
            Self::Snapshot(snapshot) => &snapshot.node,
        }
    }

    pub fn path(&self) -> &GraphPath {
        match self {
            Self::Node(output) => &output.path,
            Self::Streaming(output) => &output.path,
            Self::Snapshot(snapshot) => &snapshot.path,
        }
    }

    pub fn state(&self) -> Option<&State> {
        match self {
            Self::Node(output) => Some(&output.state),
            Self::Snapshot(snapshot) => Some(&snapshot.state),
            Self::Streaming(_) => None,
        }
    }
}

/// Sending half of a run's side channel for streamed events
#[derive(Debug, Clone)]
pub struct StreamWriter {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl StreamWriter {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the receiving stream is gone
    pub fn send(&self, event: GraphEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum GraphResult {
    /// Reached `__end__`
    Completed(State),
    /// Stopped at an interrupt; resumable from the thread's latest checkpoint
    Suspended(InterruptionMetadata),
    /// Cancelled between steps; carries the last emitted output
    Cancelled(Option<NodeOutput>),
}

impl GraphResult {
    /// State at the point the run ended, if known
    pub fn state(&self) -> Option<&State> {
        match self {
            Self::Completed(state) => Some(state),
            Self::Suspended(meta) => Some(&meta.state),
            Self::Cancelled(output) => output.as_ref().map(|o| &o.state),
        }
    }

    pub fn into_state(self) -> Option<State> {
        match self {
            Self::Completed(state) => Some(state),
            Self::Suspended(meta) => Some(meta.state),
            Self::Cancelled(output) => output.map(|o| o.state),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn interruption(&self) -> Option<&InterruptionMetadata> {
        match self {
            Self::Suspended(meta) => Some(meta),
            _ => None,
        }
    }
}

pub(crate) type ResultSlot = Arc<Mutex<Option<Result<GraphResult>>>>;

/// Lazy, cancellable stream over one graph run
pub struct GraphStream {
    inner: Pin<Box<dyn Stream<Item = GraphEvent> + Send>>,
    result: ResultSlot,
    cancel: CancellationToken,
}

impl GraphStream {
    pub(crate) fn new(
        inner: Pin<Box<dyn Stream<Item = GraphEvent> + Send>>,
        result: ResultSlot,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            result,
            cancel,
        }
    }

    /// Token that cancels the run before its next step
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation; the node in flight finishes first
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Outcome of the run, available once the stream is exhausted
    pub fn take_result(&mut self) -> Option<Result<GraphResult>> {
        self.result.lock().take()
    }

    /// Drain the remaining events and return the outcome
    pub async fn finish(mut self) -> Result<GraphResult> {
        use futures::StreamExt;

        while self.inner.next().await.is_some() {}
        self.take_result().unwrap_or_else(|| {
            Err(crate::error::GraphError::Execution(
                "stream ended without a result".to_string(),
            ))
        })
    }
}

impl Stream for GraphStream {
    type Item = GraphEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for GraphStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.result.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptKind;
    use serde_json::json;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = GraphEvent::Streaming(StreamingOutput {
            node: "llm".to_string(),
            chunk: json!("tok"),
            path: GraphPath::root_path(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("streaming"));
        assert_eq!(value["chunk"], json!("tok"));
    }

    #[test]
    fn test_result_state_accessors() {
        let state = State::from_value(json!({"a": 1})).unwrap();
        let suspended = GraphResult::Suspended(InterruptionMetadata::new(
            "b",
            InterruptKind::Before,
            state.clone(),
        ));
        assert!(suspended.is_suspended());
        assert_eq!(suspended.state(), Some(&state));
        assert_eq!(suspended.interruption().map(|m| m.node_id.as_str()), Some("b"));

        assert_eq!(GraphResult::Cancelled(None).state(), None);
    }

    #[test]
    fn test_snapshot_run_config() {
        let snapshot = StateSnapshot {
            node: "a".to_string(),
            next: "b".to_string(),
            state: State::new(),
            thread_id: "t1".to_string(),
            checkpoint_id: Some("cp".to_string()),
            path: GraphPath::root_path(),
            metadata: Map::new(),
        };
        let config = snapshot.run_config();
        assert_eq!(config.thread_id(), "t1");
        assert_eq!(config.checkpoint_id.as_deref(), Some("cp"));
    }

    #[tokio::test]
    async fn test_writer_reports_closed_receiver() {
        let (writer, rx) = StreamWriter::channel();
        assert!(writer.send(GraphEvent::Node(NodeOutput::new(
            "a",
            State::new(),
            GraphPath::root_path()
        ))));
        drop(rx);
        assert!(writer.is_closed());
    }
}

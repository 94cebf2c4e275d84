//! Run and compile configuration
//!
//! [`RunConfig`] travels with one invocation: which thread's checkpoint
//! history to use, how to stream, and where in a tree of nested graphs the
//! current node runs. Node actions receive a copy; subgraphs derive a child
//! copy with an extended [`GraphPath`], so a parent's config is never
//! mutated by what runs beneath it.
//!
//! [`CompileConfig`] is fixed when a graph is compiled: the checkpoint
//! saver, interrupt points and run limits. Everything except the saver can
//! be loaded from YAML.
//!
//! ```rust
//! use stepgraph_core::{CompileConfig, RunConfig, StreamMode};
//!
//! let run = RunConfig::new()
//!     .with_thread_id("conversation-42")
//!     .with_stream_mode(StreamMode::Snapshots);
//! assert_eq!(run.thread_id(), "conversation-42");
//!
//! let compile = CompileConfig::from_yaml(
//!     "interrupt_before: [review]\nrelease_thread: true\nmax_iterations: 50\n",
//! )
//! .unwrap();
//! assert!(compile.interrupts.should_interrupt_before("review"));
//! assert_eq!(compile.max_iterations, 50);
//! ```

use crate::error::Result;
use crate::graph::NodeId;
use crate::interrupt::InterruptConfig;
use crate::path::GraphPath;
use crate::state::Delta;
use crate::stream::{GraphEvent, StreamWriter, StreamingOutput};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use stepgraph_checkpoint::{CheckpointConfig, CheckpointId, CheckpointSaver};

/// Thread id used when a run does not name one
pub const DEFAULT_THREAD_ID: &str = "$default";

/// Default bound on executed steps per run
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// What a stream emits after each step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// A `NodeOutput` with the full state
    #[default]
    Values,
    /// A `StateSnapshot` including the checkpoint written by the step
    Snapshots,
}

/// Per-invocation configuration
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Checkpoint thread; `"$default"` when unset
    pub thread_id: Option<String>,

    /// Checkpoint to resume from or edit; the latest when unset
    pub checkpoint_id: Option<CheckpointId>,

    pub stream_mode: StreamMode,

    /// Free-form metadata for hooks and actions
    pub metadata: Map<String, Value>,

    /// Set when the run is driven by an embedding host rather than a
    /// direct caller
    pub embedded: bool,

    pub(crate) graph_id: Option<String>,
    pub(crate) graph_path: GraphPath,
    pub(crate) node_id: Option<NodeId>,
    pub(crate) writer: Option<StreamWriter>,
    pub(crate) resume: Option<Delta>,
    /// Set on a subgraph node that suspended inside its nested run and is
    /// now being resumed
    pub(crate) resume_subgraph: bool,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    /// Address the checkpoint history of a nested graph
    ///
    /// Used with [`CompiledGraph::get_state`] and friends to inspect a
    /// subgraph's history on the same thread.
    ///
    /// [`CompiledGraph::get_state`]: crate::compiled::CompiledGraph::get_state
    pub fn with_graph_path(mut self, path: GraphPath) -> Self {
        self.graph_path = path;
        self
    }

    pub fn thread_id(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(DEFAULT_THREAD_ID)
    }

    /// Position of the running graph among nested graphs
    pub fn graph_path(&self) -> &GraphPath {
        &self.graph_path
    }

    /// Node currently executing, inside node actions and hooks
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    /// Id of the root graph of the run, if it declares one
    pub fn graph_id(&self) -> Option<&str> {
        self.graph_id.as_deref()
    }

    /// True inside the first node executed after a resume
    pub fn is_resuming(&self) -> bool {
        self.resume.is_some()
    }

    /// Patch supplied with the resume, inside the first node executed
    /// after it
    pub fn resume_patch(&self) -> Option<&Delta> {
        self.resume.as_ref()
    }

    /// Address of this run's checkpoint history
    ///
    /// Nested graphs keep their history in a namespace equal to their graph
    /// path.
    pub fn checkpoint_config(&self) -> CheckpointConfig {
        let mut config = CheckpointConfig::new().with_thread_id(self.thread_id().to_string());
        if !self.graph_path.is_empty() {
            config = config.with_checkpoint_ns(self.graph_path.to_string());
        }
        if let Some(id) = &self.checkpoint_id {
            config = config.with_checkpoint_id(id.clone());
        }
        config
    }

    /// Config for a graph nested under `node_id`
    ///
    /// The path gains `node_id`, prefixed by the root graph id when this is
    /// the root graph. Thread, stream mode and metadata are inherited; the
    /// checkpoint id and resume state are not.
    pub fn subgraph_config(&self, node_id: &str) -> Result<RunConfig> {
        let base = match (&self.graph_id, self.graph_path.is_empty()) {
            (Some(id), true) => GraphPath::of([id])?,
            _ => self.graph_path.clone(),
        };
        Ok(RunConfig {
            graph_path: base.append(node_id)?,
            graph_id: None,
            node_id: None,
            checkpoint_id: None,
            resume: None,
            resume_subgraph: false,
            ..self.clone()
        })
    }

    /// Send a partial result of the running node to the stream
    ///
    /// Returns `false` when the run has no live stream.
    pub fn emit(&self, chunk: impl Into<Value>) -> bool {
        let Some(writer) = &self.writer else {
            return false;
        };
        writer.send(GraphEvent::Streaming(StreamingOutput {
            node: self.node_id.clone().unwrap_or_default(),
            chunk: chunk.into(),
            path: self.graph_path.clone(),
        }))
    }

    pub(crate) fn forward(&self, event: GraphEvent) {
        if let Some(writer) = &self.writer {
            writer.send(event);
        }
    }

    pub(crate) fn for_node(&self, node_id: &str, resume: Option<Delta>) -> RunConfig {
        RunConfig {
            node_id: Some(node_id.to_string()),
            resume,
            ..self.clone()
        }
    }
}

/// Compile-time configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    #[serde(skip)]
    pub checkpoint_saver: Option<Arc<dyn CheckpointSaver>>,

    #[serde(flatten)]
    pub interrupts: InterruptConfig,

    /// Id of the graph, used as the first path segment of nested graphs
    pub graph_id: Option<String>,

    /// Release the thread's checkpoint history when a run completes
    pub release_thread: bool,

    /// Bound on executed steps per run
    pub max_iterations: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            checkpoint_saver: None,
            interrupts: InterruptConfig::default(),
            graph_id: None,
            release_thread: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl CompileConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_checkpoint_saver(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpoint_saver = Some(saver);
        self
    }

    pub fn with_interrupts(mut self, interrupts: InterruptConfig) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn interrupt_before(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupts.interrupt_before = nodes;
        self
    }

    pub fn interrupt_after(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupts.interrupt_after = nodes;
        self
    }

    pub fn with_graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = Some(graph_id.into());
        self
    }

    pub fn with_release_thread(mut self, release: bool) -> Self {
        self.release_thread = release;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }
}

impl fmt::Debug for CompileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileConfig")
            .field("checkpoint_saver", &self.checkpoint_saver.is_some())
            .field("interrupts", &self.interrupts)
            .field("graph_id", &self.graph_id)
            .field("release_thread", &self.release_thread)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

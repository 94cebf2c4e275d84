//! Step-by-step execution of one run
//!
//! A [`Runner`] owns the mutable side of a run: the current state, the node
//! about to execute and the step counter. Each call to [`Runner::step`]
//! executes exactly one node:
//!
//! ```text
//!           ┌──────────────────────────────────────────────────────┐
//!           ▼                                                      │
//! interrupt_before? ─▶ execute node ─▶ route ─▶ checkpoint ─▶ emit ┤
//!    │ yes                 │ interrupted           interrupt_after?│
//!    ▼                     ▼                          │ yes        │
//! Suspended            Suspended                  Suspended     next node
//! ```
//!
//! The checkpoint written after a step always names the node to run next,
//! so a suspended run resumes by loading the latest checkpoint and
//! executing its `next_node_id`.

use super::graph::{CompiledGraph, CompiledNode};
use super::types::GraphInput;
use crate::config::{RunConfig, StreamMode};
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, END, START};
use crate::interrupt::{InterruptKind, InterruptionMetadata, SUSPENDED_SUBGRAPH};
use crate::state::{Delta, State};
use crate::stream::{GraphEvent, GraphResult, NodeOutput, StateSnapshot};
use serde_json::{json, Map};
use stepgraph_checkpoint::{Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource};
use tracing::{debug, error, info};

/// Outcome of one [`Runner::step`]
#[derive(Debug)]
pub(crate) enum Step {
    /// A node ran; the run continues
    Output(GraphEvent),
    /// The run ended, optionally after one last event
    Done {
        output: Option<GraphEvent>,
        result: GraphResult,
    },
}

pub(crate) struct Runner {
    graph: CompiledGraph,
    config: RunConfig,
    state: State,
    current: NodeId,
    /// Node the run was resumed at, until it has executed
    resumed_node: Option<NodeId>,
    resume_patch: Option<Delta>,
    step: i32,
    iterations: usize,
    last_output: Option<NodeOutput>,
    /// Checkpoint the first write replaces, when resuming from a given id
    update_in_place: Option<CheckpointId>,
    /// Latest checkpoint of this run, the one naming `current` as next
    checkpoint_id: Option<CheckpointId>,
    /// The resumed node suspended inside its subgraph on the last run
    resume_subgraph: bool,
}

impl Runner {
    pub(crate) async fn start(
        graph: CompiledGraph,
        input: GraphInput,
        mut config: RunConfig,
    ) -> Result<Self> {
        if config.graph_path.is_empty() && config.graph_id.is_none() {
            config.graph_id = graph.graph_id().map(str::to_string);
        }

        match input {
            GraphInput::Args(delta) => {
                config.checkpoint_id = None;
                let schema = graph.schema();
                let state = schema.merge(&schema.initial_state(), &delta)?;
                let (next, state) = graph.route(START, &state, &config).await?;
                debug!(
                    thread_id = %config.thread_id(),
                    path = %config.graph_path(),
                    next = %next,
                    "starting run"
                );

                let mut runner = Self::new(graph, config, state, next);
                runner.save(START, CheckpointSource::Input).await?;
                Ok(runner)
            }
            GraphInput::Resume(patch) => {
                let saver = graph.checkpoint_saver().cloned().ok_or_else(|| {
                    GraphError::Configuration("resuming requires a checkpoint saver".to_string())
                })?;
                let checkpoint = saver
                    .get(&config.checkpoint_config())
                    .await?
                    .ok_or_else(|| {
                        GraphError::Execution(format!(
                            "no checkpoint to resume on thread '{}'",
                            config.thread_id()
                        ))
                    })?;
                let state = graph.schema().merge(&State::from(checkpoint.state), &patch)?;
                debug!(
                    thread_id = %config.thread_id(),
                    path = %config.graph_path(),
                    checkpoint_id = %checkpoint.id,
                    next = %checkpoint.next_node_id,
                    "resuming run"
                );

                let update_in_place = config.checkpoint_id.take();
                let resume_subgraph = checkpoint
                    .metadata
                    .extra
                    .get(SUSPENDED_SUBGRAPH)
                    .and_then(|node| node.as_str())
                    == Some(checkpoint.next_node_id.as_str());
                let mut runner = Self::new(graph, config, state, checkpoint.next_node_id);
                runner.checkpoint_id = Some(checkpoint.id);
                runner.resume_subgraph = resume_subgraph;
                runner.resumed_node = Some(runner.current.clone());
                runner.resume_patch = Some(patch);
                runner.step = checkpoint.metadata.step.map_or(0, |step| step + 1);
                runner.update_in_place = update_in_place;
                Ok(runner)
            }
        }
    }

    fn new(graph: CompiledGraph, config: RunConfig, state: State, current: NodeId) -> Self {
        Self {
            graph,
            config,
            state,
            current,
            resumed_node: None,
            resume_patch: None,
            step: -1,
            iterations: 0,
            last_output: None,
            update_in_place: None,
            checkpoint_id: None,
            resume_subgraph: false,
        }
    }

    /// Last output emitted by this run
    pub(crate) fn last_output(&self) -> Option<NodeOutput> {
        self.last_output.clone()
    }

    /// Execute the next node
    pub(crate) async fn step(&mut self) -> Result<Step> {
        if self.current == END {
            return self.complete().await;
        }

        let max_iterations = self.graph.config().max_iterations;
        if self.iterations >= max_iterations {
            return Err(GraphError::Execution(format!(
                "run exceeded {max_iterations} iterations"
            )));
        }
        self.iterations += 1;

        let node_id = self.current.clone();
        let resumed_here = self.resumed_node.take().as_deref() == Some(node_id.as_str());
        let resume_patch = self.resume_patch.take();
        let resume_subgraph = std::mem::take(&mut self.resume_subgraph) && resumed_here;
        let interrupts = &self.graph.config().interrupts;
        let synthetic = matches!(self.graph.node(&node_id), Some(CompiledNode::Parallel(_)));

        if !resumed_here && !synthetic && interrupts.should_interrupt_before(&node_id) {
            let interruption =
                InterruptionMetadata::new(node_id, InterruptKind::Before, self.state.clone());
            return Ok(self.suspend(interruption));
        }

        let mut node_config = self.config.for_node(&node_id, resume_patch);
        node_config.resume_subgraph = resume_subgraph;
        let state = match self
            .graph
            .execute_node(&node_id, &self.state, &node_config)
            .await
        {
            Ok(state) => state,
            Err(GraphError::Interrupted { reason, .. }) => {
                let interruption =
                    InterruptionMetadata::new(node_id, InterruptKind::Node, self.state.clone())
                        .with_metadata("reason", reason);
                return Ok(self.suspend(interruption));
            }
            Err(GraphError::SubgraphInterrupted(nested)) if self.graph.is_subgraph_node(&node_id) => {
                self.mark_subgraph_suspension(&node_id).await?;
                let interruption =
                    InterruptionMetadata::new(node_id, InterruptKind::Subgraph, self.state.clone())
                        .with_subgraph(nested.interruption);
                return Ok(self.suspend(interruption));
            }
            Err(e) => {
                error!(node = %node_id, path = %self.config.graph_path(), error = %e, "node failed");
                return Err(e);
            }
        };

        let (next, state) = self.graph.route(&node_id, &state, &node_config).await?;
        self.state = state;
        self.current = next;

        let step = self.step;
        let checkpoint_id = self.save(&node_id, CheckpointSource::Loop).await?;
        debug!(
            node = %node_id,
            next = %self.current,
            step,
            path = %self.config.graph_path(),
            "step completed"
        );

        let output = NodeOutput::new(
            node_id.clone(),
            self.state.clone(),
            self.config.graph_path().clone(),
        );
        self.last_output = Some(output.clone());
        let event = self.event(output, checkpoint_id, step);

        if !synthetic && self.graph.config().interrupts.should_interrupt_after(&node_id) {
            let interruption = InterruptionMetadata::new(
                self.current.clone(),
                InterruptKind::After,
                self.state.clone(),
            )
            .with_metadata("after", node_id);
            info!(
                node = %interruption.node_id,
                thread_id = %self.config.thread_id(),
                "run suspended after node"
            );
            return Ok(Step::Done {
                output: Some(event),
                result: GraphResult::Suspended(interruption),
            });
        }

        Ok(Step::Output(event))
    }

    async fn complete(&mut self) -> Result<Step> {
        if self.graph.config().release_thread && self.config.graph_path().is_empty() {
            if let Some(saver) = self.graph.checkpoint_saver() {
                let tag = saver
                    .release(&self.config.checkpoint_config().without_checkpoint_id())
                    .await?;
                debug!(
                    thread_id = %tag.thread_id,
                    checkpoints = tag.checkpoints.len(),
                    "released thread"
                );
            }
        }

        info!(
            thread_id = %self.config.thread_id(),
            path = %self.config.graph_path(),
            iterations = self.iterations,
            "run completed"
        );
        let output = NodeOutput::new(END, self.state.clone(), self.config.graph_path().clone());
        self.last_output = Some(output.clone());
        let event = self.event(output, None, self.step);
        Ok(Step::Done {
            output: Some(event),
            result: GraphResult::Completed(self.state.clone()),
        })
    }

    fn suspend(&self, interruption: InterruptionMetadata) -> Step {
        info!(
            node = %interruption.node_id,
            kind = ?interruption.kind,
            thread_id = %self.config.thread_id(),
            path = %self.config.graph_path(),
            "run suspended"
        );
        Step::Done {
            output: None,
            result: GraphResult::Suspended(interruption),
        }
    }

    /// Tag the latest checkpoint with the subgraph node that suspended
    ///
    /// The checkpoint is updated in place, so the history keeps its length.
    async fn mark_subgraph_suspension(&self, node_id: &str) -> Result<()> {
        let (Some(saver), Some(id)) = (self.graph.checkpoint_saver(), &self.checkpoint_id) else {
            return Ok(());
        };
        let target = self.config.checkpoint_config().without_checkpoint_id();
        let addressed = target.clone().with_checkpoint_id(id.clone());
        let Some(mut checkpoint) = saver.get(&addressed).await? else {
            return Ok(());
        };
        checkpoint
            .metadata
            .extra
            .insert(SUSPENDED_SUBGRAPH.to_string(), json!(node_id));
        saver.update(&target, id, checkpoint).await?;
        Ok(())
    }

    /// Persist the current state; returns the stored checkpoint's id
    async fn save(&mut self, node_id: &str, source: CheckpointSource) -> Result<Option<CheckpointId>> {
        let step = self.step;
        self.step += 1;
        let Some(saver) = self.graph.checkpoint_saver().cloned() else {
            return Ok(None);
        };

        let checkpoint = Checkpoint::new(node_id, self.current.clone(), self.state.data().clone())
            .with_metadata(CheckpointMetadata::new().with_source(source).with_step(step));
        let mut target = self.config.checkpoint_config().without_checkpoint_id();
        if let Some(id) = self.update_in_place.take() {
            target = target.with_checkpoint_id(id);
        }
        let stored = saver.put(&target, checkpoint).await?;
        self.checkpoint_id = stored.checkpoint_id.clone();
        Ok(stored.checkpoint_id)
    }

    fn event(&self, output: NodeOutput, checkpoint_id: Option<CheckpointId>, step: i32) -> GraphEvent {
        match self.config.stream_mode {
            StreamMode::Values => GraphEvent::Node(output),
            StreamMode::Snapshots => {
                let mut metadata = Map::new();
                metadata.insert("step".to_string(), json!(step));
                GraphEvent::Snapshot(StateSnapshot {
                    node: output.node,
                    next: self.current.clone(),
                    state: output.state,
                    thread_id: self.config.thread_id().to_string(),
                    checkpoint_id,
                    path: output.path,
                    metadata,
                })
            }
        }
    }
}

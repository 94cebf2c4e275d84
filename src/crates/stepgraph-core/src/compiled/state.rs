//! State inspection and manipulation
//!
//! These operations read and write a thread's checkpoint history directly,
//! without running nodes. They all require a checkpoint saver.
//!
//! ```text
//! get_state           latest (or addressed) checkpoint as a StateSnapshot
//! get_state_history   every checkpoint of the thread, most recent first
//! update_state        merge a patch, optionally re-routing as a node
//! release_thread      retire the thread's history
//! ```

use super::graph::CompiledGraph;
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::graph::START;
use crate::interrupt::SUSPENDED_SUBGRAPH;
use crate::state::{Delta, State};
use crate::stream::StateSnapshot;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use stepgraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSaver, CheckpointSource, Tag,
};
use tracing::debug;

impl CompiledGraph {
    fn saver(&self) -> Result<&Arc<dyn CheckpointSaver>> {
        self.checkpoint_saver().ok_or_else(|| {
            GraphError::Configuration("graph was compiled without a checkpoint saver".to_string())
        })
    }

    /// Snapshot of the checkpoint addressed by `config`
    ///
    /// The latest checkpoint of the thread unless `config` names one.
    /// `None` when the thread has no (active) history.
    pub async fn get_state(&self, config: &RunConfig) -> Result<Option<StateSnapshot>> {
        let checkpoint = self.saver()?.get(&config.checkpoint_config()).await?;
        checkpoint
            .map(|checkpoint| snapshot(config, checkpoint))
            .transpose()
    }

    /// Snapshots of the thread's history, most recent first
    pub async fn get_state_history(&self, config: &RunConfig) -> Result<Vec<StateSnapshot>> {
        let mut history = self
            .saver()?
            .list(&config.checkpoint_config().without_checkpoint_id())
            .await?;

        let mut snapshots = Vec::new();
        while let Some(checkpoint) = history.next().await {
            snapshots.push(snapshot(config, checkpoint?)?);
        }
        Ok(snapshots)
    }

    /// Merge `patch` into the checkpointed state
    ///
    /// Without `as_node` the checkpoint keeps its next node. With `as_node`
    /// the state is treated as that node's output: its outgoing edge is
    /// evaluated and the result decides the next node.
    ///
    /// When `config` names a checkpoint, that checkpoint is replaced in
    /// place; otherwise a new checkpoint is appended. Returns a config
    /// addressing the written checkpoint, which can be used to resume.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use stepgraph_core::{
    ///     CompileConfig, Delta, GraphInput, InMemoryCheckpointSaver, RunConfig, Schema,
    ///     StateGraph, END, START,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> stepgraph_core::Result<()> {
    /// let mut graph = StateGraph::new(Schema::new());
    /// graph
    ///     .add_node("review", |_state, _config| async { Ok(Delta::new()) })
    ///     .add_edge(START, "review")
    ///     .add_edge("review", END);
    ///
    /// let compiled = graph.compile_with(
    ///     CompileConfig::new()
    ///         .with_checkpoint_saver(Arc::new(InMemoryCheckpointSaver::new()))
    ///         .interrupt_before(vec!["review".to_string()]),
    /// )?;
    ///
    /// let config = RunConfig::new().with_thread_id("t1");
    /// let result = compiled.invoke(GraphInput::args(Delta::new()), config.clone()).await?;
    /// assert!(result.is_suspended());
    ///
    /// let updated = compiled
    ///     .update_state(&config, Delta::new().set("approved", true), None)
    ///     .await?;
    /// let result = compiled.invoke(GraphInput::resume(), updated).await?;
    /// assert_eq!(result.state().and_then(|s| s.value::<bool>("approved")), Some(true));
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip_all, fields(thread_id = %config.thread_id(), as_node = ?as_node))]
    pub async fn update_state(
        &self,
        config: &RunConfig,
        patch: Delta,
        as_node: Option<&str>,
    ) -> Result<RunConfig> {
        let saver = self.saver()?;
        let target = config.checkpoint_config();
        let existing = saver.get(&target).await?;
        if let (Some(id), None) = (&config.checkpoint_id, &existing) {
            return Err(CheckpointError::NotFound(id.clone()).into());
        }

        let (base, step) = match &existing {
            Some(checkpoint) => (
                State::from(checkpoint.state.clone()),
                checkpoint.metadata.step.unwrap_or(-1),
            ),
            None => (self.schema().initial_state(), -1),
        };
        let state = self.schema().merge(&base, &patch)?;

        let (node, next, state) = match (as_node, &existing) {
            (Some(as_node), _) => {
                if as_node != START && !self.node_ids().iter().any(|id| id == as_node) {
                    return Err(GraphError::Configuration(format!(
                        "cannot update state as '{as_node}', which is not a node of this graph"
                    )));
                }
                let (next, state) = self.route(as_node, &state, config).await?;
                (as_node.to_string(), next, state)
            }
            (None, Some(checkpoint)) => (
                checkpoint.node_id.clone(),
                checkpoint.next_node_id.clone(),
                state,
            ),
            (None, None) => {
                let (next, state) = self.route(START, &state, config).await?;
                (START.to_string(), next, state)
            }
        };

        let step = if config.checkpoint_id.is_some() { step } else { step + 1 };
        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_step(step);
        // Keeping the pending node keeps a pending subgraph resume too.
        let suspended = existing
            .as_ref()
            .filter(|_| as_node.is_none())
            .and_then(|checkpoint| checkpoint.metadata.extra.get(SUSPENDED_SUBGRAPH));
        if let Some(marked) = suspended {
            metadata = metadata.with_extra(SUSPENDED_SUBGRAPH, marked.clone());
        }
        let checkpoint =
            Checkpoint::new(node.clone(), next.clone(), state.into_data()).with_metadata(metadata);
        let stored = saver.put(&target, checkpoint).await?;
        debug!(
            thread_id = %config.thread_id(),
            as_node = %node,
            next = %next,
            "state updated"
        );

        let mut updated = config.clone();
        updated.checkpoint_id = stored.checkpoint_id;
        Ok(updated)
    }

    /// Retire the thread's history
    ///
    /// Released checkpoints are no longer returned by [`get_state`] and can
    /// no longer be resumed. Every namespace of the thread is released.
    ///
    /// [`get_state`]: Self::get_state
    pub async fn release_thread(&self, config: &RunConfig) -> Result<Tag> {
        let tag = self
            .saver()?
            .release(&config.checkpoint_config().without_checkpoint_id())
            .await?;
        debug!(thread_id = %tag.thread_id, checkpoints = tag.checkpoints.len(), "thread released");
        Ok(tag)
    }
}

fn snapshot(config: &RunConfig, checkpoint: Checkpoint) -> Result<StateSnapshot> {
    let metadata = match serde_json::to_value(&checkpoint.metadata)? {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    Ok(StateSnapshot {
        node: checkpoint.node_id,
        next: checkpoint.next_node_id,
        state: State::from(checkpoint.state),
        thread_id: config.thread_id().to_string(),
        checkpoint_id: Some(checkpoint.id),
        path: config.graph_path().clone(),
        metadata,
    })
}

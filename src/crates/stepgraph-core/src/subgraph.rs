//! Compiled graphs embedded as nodes of a parent graph
//!
//! A subgraph node runs a whole [`CompiledGraph`] as the action of one
//! parent node:
//!
//! ```text
//! parent:  __start__ ─▶ prepare ─▶ [review] ─▶ publish ─▶ __end__
//!                                     │
//!                   path "review"     ▼
//! child:            __start__ ─▶ draft ─▶ critique ─▶ __end__
//! ```
//!
//! - The child runs on the parent's thread, with its checkpoints kept in
//!   the namespace of its [`GraphPath`] (`"review"`, or `"<graph_id>/review"`
//!   when the parent declares a graph id).
//! - Child events are forwarded into the parent stream.
//! - The parent receives only the keys whose value changed during the child
//!   run, as replacements. A key the child removed is left alone in the
//!   parent.
//! - If the child suspends, the parent suspends too
//!   ([`InterruptKind::Subgraph`]). Resuming the parent re-enters this node,
//!   which resumes the child's unfinished history when the child graph has a
//!   checkpoint saver.
//!
//! Actions that call [`SubgraphNode::run`] themselves receive the child's
//! suspension as [`GraphError::SubgraphInterrupted`] and decide what to do
//! with it.
//!
//! [`GraphPath`]: crate::path::GraphPath
//! [`InterruptKind::Subgraph`]: crate::interrupt::InterruptKind::Subgraph

use crate::compiled::{CompiledGraph, GraphInput};
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::graph::END;
use crate::interrupt::SubgraphInterruption;
use crate::state::{Delta, State, Update};
use crate::stream::GraphResult;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which keys cross the subgraph boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubgraphConfig {
    /// Parent keys passed to the child; all when unset
    pub input_keys: Option<Vec<String>>,

    /// Child keys returned to the parent; all when unset
    pub output_keys: Option<Vec<String>>,
}

impl SubgraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_output_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    fn passes_input(&self, key: &str) -> bool {
        allowed(&self.input_keys, key)
    }

    fn passes_output(&self, key: &str) -> bool {
        allowed(&self.output_keys, key)
    }
}

fn allowed(keys: &Option<Vec<String>>, key: &str) -> bool {
    keys.as_ref().map_or(true, |keys| keys.iter().any(|k| k == key))
}

/// A compiled graph used as a node
#[derive(Debug, Clone)]
pub struct SubgraphNode {
    graph: CompiledGraph,
    config: SubgraphConfig,
}

impl SubgraphNode {
    pub fn new(graph: CompiledGraph, config: SubgraphConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn config(&self) -> &SubgraphConfig {
        &self.config
    }

    /// Run the child graph for parent node `node_id`
    ///
    /// Returns the parent delta, or `GraphError::SubgraphInterrupted` when
    /// the child suspended.
    pub async fn run(&self, node_id: &str, state: State, config: RunConfig) -> Result<Delta> {
        let child_config = config.subgraph_config(node_id)?;
        let input = self.child_input(&state, &config, &child_config).await?;
        debug!(
            node = node_id,
            path = %child_config.graph_path(),
            resume = matches!(input, GraphInput::Resume(_)),
            "entering subgraph"
        );

        let mut stream = self.graph.stream(input, child_config);
        while let Some(event) = stream.next().await {
            config.forward(event);
        }

        match stream.take_result() {
            Some(Ok(GraphResult::Completed(final_state))) => {
                Ok(self.parent_delta(&state, &final_state))
            }
            Some(Ok(GraphResult::Suspended(interruption))) => Err(GraphError::subgraph_interrupted(
                SubgraphInterruption::new(node_id, interruption),
            )),
            Some(Ok(GraphResult::Cancelled(_))) => Err(GraphError::Execution(format!(
                "subgraph '{node_id}' was cancelled"
            ))),
            Some(Err(e)) => Err(e),
            None => Err(GraphError::Execution(format!(
                "subgraph '{node_id}' ended without a result"
            ))),
        }
    }

    /// Resume the child when the parent run suspended inside it, start it
    /// fresh otherwise
    ///
    /// A leftover child history from an abandoned parent run is never
    /// resumed; the fresh start supersedes it.
    async fn child_input(
        &self,
        state: &State,
        config: &RunConfig,
        child_config: &RunConfig,
    ) -> Result<GraphInput> {
        let resumable = config.resume_subgraph.then(|| config.resume_patch()).flatten();
        if let (Some(patch), Some(saver)) = (resumable, self.graph.checkpoint_saver()) {
            let latest = saver.get(&child_config.checkpoint_config()).await?;
            if latest.is_some_and(|cp| cp.next_node_id != END) {
                let patch = patch
                    .iter()
                    .filter(|(key, _)| self.config.passes_input(key))
                    .map(|(key, update)| (key.to_string(), update.clone()))
                    .collect();
                return Ok(GraphInput::Resume(patch));
            }
        }

        let args = state
            .iter()
            .filter(|(key, _)| self.config.passes_input(key))
            .map(|(key, value)| (key.clone(), Update::Replace(value.clone())))
            .collect();
        Ok(GraphInput::Args(args))
    }

    /// Keys whose value differs from the parent's, as replacements
    fn parent_delta(&self, parent: &State, child: &State) -> Delta {
        child
            .iter()
            .filter(|(key, value)| self.config.passes_output(key) && parent.get(key) != Some(*value))
            .map(|(key, value)| (key.clone(), Update::Replace(value.clone())))
            .collect()
    }
}

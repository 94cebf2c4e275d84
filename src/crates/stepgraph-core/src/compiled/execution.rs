//! Graph execution: invoke, stream, node execution and routing

use super::graph::{CompiledGraph, CompiledNode, Route};
use super::runner::{Runner, Step};
use super::types::GraphInput;
use crate::command::Command;
use crate::config::RunConfig;
use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::hook::{action, NodeAction};
use crate::state::State;
use crate::stream::{GraphEvent, GraphResult, GraphStream, ResultSlot, StreamWriter};
use crate::subgraph::SubgraphNode;
use futures::future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What the stream loop observed first
enum Polled {
    Event(GraphEvent),
    Step(Result<Step>),
}

impl CompiledGraph {
    /// Run the graph until it completes, suspends or fails
    ///
    /// # Example
    ///
    /// ```rust
    /// use stepgraph_core::{Delta, GraphInput, RunConfig, Schema, StateGraph, END, START};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> stepgraph_core::Result<()> {
    /// let mut graph = StateGraph::new(Schema::new());
    /// graph
    ///     .add_node("double", |state, _config| async move {
    ///         let n = state.value::<i64>("n").unwrap_or(0);
    ///         Ok(Delta::new().set("n", n * 2))
    ///     })
    ///     .add_edge(START, "double")
    ///     .add_edge("double", END);
    ///
    /// let compiled = graph.compile()?;
    /// let input = GraphInput::args(Delta::new().set("n", 21));
    /// let result = compiled.invoke(input, RunConfig::new()).await?;
    /// assert_eq!(result.state().and_then(|s| s.value::<i64>("n")), Some(42));
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(
        skip_all,
        fields(thread_id = %config.thread_id(), path = %config.graph_path())
    )]
    pub async fn invoke(&self, input: impl Into<GraphInput>, config: RunConfig) -> Result<GraphResult> {
        self.stream(input, config).finish().await
    }

    /// Run the graph lazily, one step per poll of the returned stream
    ///
    /// Dropping the stream abandons the run after the step in flight. Use
    /// [`GraphStream::cancel`] to stop it cleanly with a
    /// [`GraphResult::Cancelled`] outcome.
    #[tracing::instrument(
        skip_all,
        fields(thread_id = %config.thread_id(), path = %config.graph_path())
    )]
    pub fn stream(&self, input: impl Into<GraphInput>, mut config: RunConfig) -> GraphStream {
        let (writer, mut events) = StreamWriter::channel();
        config.writer = Some(writer);

        let graph = self.clone();
        let input = input.into();
        let result: ResultSlot = Arc::default();
        let cancel = CancellationToken::new();

        let slot = result.clone();
        let token = cancel.clone();
        let inner = async_stream::stream! {
            let mut runner = match Runner::start(graph, input, config).await {
                Ok(runner) => runner,
                Err(e) => {
                    error!(error = %e, "failed to start run");
                    *slot.lock() = Some(Err(e));
                    return;
                }
            };

            loop {
                if token.is_cancelled() {
                    info!("run cancelled");
                    *slot.lock() = Some(Ok(GraphResult::Cancelled(runner.last_output())));
                    break;
                }

                let outcome = {
                    let step = runner.step();
                    tokio::pin!(step);
                    loop {
                        let polled = tokio::select! {
                            biased;
                            Some(event) = events.recv() => Polled::Event(event),
                            outcome = &mut step => Polled::Step(outcome),
                        };
                        match polled {
                            Polled::Event(event) => yield event,
                            Polled::Step(outcome) => break outcome,
                        }
                    }
                };

                while let Ok(event) = events.try_recv() {
                    yield event;
                }

                match outcome {
                    Ok(Step::Output(event)) => yield event,
                    Ok(Step::Done { output, result }) => {
                        if let Some(event) = output {
                            yield event;
                        }
                        *slot.lock() = Some(Ok(result));
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "run failed");
                        *slot.lock() = Some(Err(e));
                        break;
                    }
                }
            }
        };

        GraphStream::new(Box::pin(inner), result, cancel)
    }

    /// Run one node through the node hooks and merge its delta
    pub(crate) async fn execute_node(
        &self,
        node_id: &str,
        state: &State,
        config: &RunConfig,
    ) -> Result<State> {
        let schema = &self.inner.schema;
        let hooks = &self.inner.node_hooks;

        let action = match self.node(node_id) {
            Some(CompiledNode::Action(action)) => action.clone(),
            Some(CompiledNode::Subgraph(sub)) => subgraph_action(node_id, sub),
            Some(CompiledNode::Parallel(branches)) => {
                let calls = future::try_join_all(branches.iter().map(|(branch, action)| {
                    let branch_config = config.for_node(branch, None);
                    async move {
                        hooks
                            .apply(branch, state, &branch_config, action.clone(), schema)
                            .await
                    }
                }))
                .await?;

                let mut merged = state.clone();
                for call in &calls {
                    for delta in &call.before {
                        merged = schema.merge(&merged, delta)?;
                    }
                    merged = schema.merge(&merged, &call.result)?;
                }
                return Ok(merged);
            }
            None => {
                return Err(GraphError::Execution(format!(
                    "node '{node_id}' does not exist"
                )))
            }
        };

        let call = hooks.apply(node_id, state, config, action, schema).await?;
        Ok(schema.merge(&call.state, &call.result)?)
    }

    /// Resolve the node after `node_id`
    ///
    /// Conditional edges run through the edge hooks; the command's update
    /// is merged into the returned state.
    pub(crate) async fn route(
        &self,
        node_id: &str,
        state: &State,
        config: &RunConfig,
    ) -> Result<(NodeId, State)> {
        let edge = match self.route_from(node_id) {
            Some(Route::Direct(target)) => return Ok((target.clone(), state.clone())),
            Some(Route::Conditional(edge)) => edge,
            None => {
                return Err(GraphError::Execution(format!(
                    "node '{node_id}' has no outgoing edge"
                )))
            }
        };

        let call = self
            .inner
            .edge_hooks
            .apply(node_id, state, config, edge.router.clone(), &self.inner.schema)
            .await?;
        let Command { goto, update } = call.result;
        let label = goto.ok_or_else(|| {
            GraphError::node_execution(node_id, "conditional edge returned no routing label")
        })?;
        let Some(target) = edge.mappings.get(&label) else {
            warn!(node = %node_id, label = %label, "routing label has no mapping");
            return Err(GraphError::routing(node_id, label));
        };

        let state = self.inner.schema.merge(&call.state, &update)?;
        Ok((target.clone(), state))
    }
}

fn subgraph_action(node_id: &str, sub: &Arc<SubgraphNode>) -> NodeAction {
    let node_id: Arc<str> = Arc::from(node_id);
    let sub = sub.clone();
    action(move |state, config| {
        let node_id = node_id.clone();
        let sub = sub.clone();
        async move { sub.run(&node_id, state, config).await }
    })
}

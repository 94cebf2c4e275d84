use super::{Action, WrapHook};
use crate::config::RunConfig;
use crate::error::Result;
use crate::state::State;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

/// Wrap hook that runs each call inside a `tracing` span
///
/// The span carries the node (or edge source) id, the graph path and the
/// thread id, so nested graphs with identically named nodes stay apart in
/// the logs. Register it globally on nodes, edges, or both:
///
/// ```rust
/// use std::sync::Arc;
/// use stepgraph_core::hook::TracingHook;
/// use stepgraph_core::{Schema, StateGraph};
///
/// let mut graph = StateGraph::new(Schema::new());
/// graph.add_node_wrap_hook(Arc::new(TracingHook));
/// graph.add_edge_wrap_hook(Arc::new(TracingHook));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

#[async_trait]
impl<R> WrapHook<R> for TracingHook
where
    R: Send + 'static,
{
    async fn wrap(&self, id: &str, state: State, config: RunConfig, next: Action<R>) -> Result<R> {
        let span = info_span!(
            "graph_call",
            id = %id,
            path = %config.graph_path(),
            thread_id = %config.thread_id(),
        );
        let started = Instant::now();
        let result = next(state, config).instrument(span.clone()).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        span.in_scope(|| match &result {
            Ok(_) => debug!(elapsed_ms, "call finished"),
            Err(e) => warn!(elapsed_ms, error = %e, "call failed"),
        });
        result
    }
}

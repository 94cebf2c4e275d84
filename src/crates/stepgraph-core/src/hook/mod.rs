//! Node and edge hooks
//!
//! Hooks intercept the execution of a node action or a conditional edge
//! router. Three shapes exist, identical for nodes and edges:
//!
//! | Hook | Signature | Order |
//! |---|---|---|
//! | [`BeforeHook`] | `(id, state, config) -> Delta` | LIFO |
//! | [`WrapHook`] | `(id, state, config, next) -> R` | FIFO, first registered is outermost |
//! | [`AfterHook`] | `(id, state, config, R) -> R` | LIFO |
//!
//! `R` is [`Delta`] for nodes and [`Command`] for edges. A before hook's
//! delta is merged into the state the action sees; an after hook receives
//! the action's result and returns a result merged on top of it.
//!
//! Each hook kind can be registered globally (every node or edge) or for
//! one id. Global hooks come first, then id-scoped ones, before the
//! ordering rule is applied.
//!
//! ```rust
//! use async_trait::async_trait;
//! use stepgraph_core::hook::{NodeAction, WrapHook};
//! use stepgraph_core::{Delta, Result, RunConfig, State};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl WrapHook<Delta> for Audit {
//!     async fn wrap(
//!         &self,
//!         id: &str,
//!         state: State,
//!         config: RunConfig,
//!         next: NodeAction,
//!     ) -> Result<Delta> {
//!         let delta = next(state, config).await?;
//!         Ok(delta.set("audited_by", id.to_string()))
//!     }
//! }
//! ```

mod calls;
mod chain;
mod trace;

pub use calls::{HookCalls, Order};
pub use chain::{EdgeHooks, HookChain, HookedCall, NodeHooks};
pub use trace::TracingHook;

use crate::command::Command;
use crate::config::RunConfig;
use crate::error::Result;
use crate::state::{Delta, State};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Async unit of work over a state, shared between hooks
pub type Action<R> =
    Arc<dyn Fn(State, RunConfig) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Node action: produces the node's delta
pub type NodeAction = Action<Delta>;

/// Edge action: produces the routing command of a conditional edge
pub type EdgeAction = Action<Command>;

/// Wrap an async closure into an [`Action`]
pub fn action<R, F, Fut>(f: F) -> Action<R>
where
    F: Fn(State, RunConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |state: State, config: RunConfig| -> BoxFuture<'static, Result<R>> {
        Box::pin(f(state, config))
    })
}

/// Result type a hook chain can combine
pub trait HookOutput: Send + 'static {
    /// Combine the action's result with an after hook's result; the after
    /// hook wins on conflicts
    fn merge_after(self, after: Self) -> Self;
}

impl HookOutput for Delta {
    fn merge_after(self, after: Self) -> Self {
        self.merged_with(after)
    }
}

impl HookOutput for Command {
    fn merge_after(self, after: Self) -> Self {
        self.merged_with(after)
    }
}

/// Runs before the action; its delta is merged into the action's input
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, id: &str, state: &State, config: &RunConfig) -> Result<Delta>;
}

/// Runs after the action with its result
#[async_trait]
pub trait AfterHook<R>: Send + Sync {
    async fn after(&self, id: &str, state: &State, config: &RunConfig, result: R) -> Result<R>;
}

/// Surrounds the action; decides whether and how `next` runs
#[async_trait]
pub trait WrapHook<R>: Send + Sync {
    async fn wrap(&self, id: &str, state: State, config: RunConfig, next: Action<R>)
        -> Result<R>;
}

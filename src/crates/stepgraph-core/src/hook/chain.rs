use super::calls::{HookCalls, Order};
use super::{Action, AfterHook, BeforeHook, HookOutput, WrapHook};
use crate::command::Command;
use crate::config::RunConfig;
use crate::error::Result;
use crate::state::{Delta, Schema, State};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Hooks registered around node actions
pub type NodeHooks = HookChain<Delta>;

/// Hooks registered around conditional edge routers
pub type EdgeHooks = HookChain<Command>;

/// Outcome of one hooked call
#[derive(Debug, Clone)]
pub struct HookedCall<R> {
    /// Deltas of the before hooks, in the order they were merged
    pub before: Vec<Delta>,
    /// State the action ran against
    pub state: State,
    /// Result of the wrapped action combined with the after hooks
    pub result: R,
}

/// Before, wrap and after hooks of one target kind
pub struct HookChain<R> {
    before: HookCalls<dyn BeforeHook>,
    after: HookCalls<dyn AfterHook<R>>,
    wrap: HookCalls<dyn WrapHook<R>>,
}

impl<R> Default for HookChain<R> {
    fn default() -> Self {
        Self {
            before: HookCalls::new(Order::Lifo),
            after: HookCalls::new(Order::Lifo),
            wrap: HookCalls::new(Order::Fifo),
        }
    }
}

impl<R> Clone for HookChain<R> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            after: self.after.clone(),
            wrap: self.wrap.clone(),
        }
    }
}

impl<R> std::fmt::Debug for HookChain<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("before", &self.before)
            .field("after", &self.after)
            .field("wrap", &self.wrap)
            .finish()
    }
}

impl<R> HookChain<R>
where
    R: HookOutput + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before(&mut self, hook: Arc<dyn BeforeHook>) {
        self.before.add(hook);
    }

    pub fn add_before_for(&mut self, id: impl Into<String>, hook: Arc<dyn BeforeHook>) {
        self.before.add_for(id, hook);
    }

    pub fn add_after(&mut self, hook: Arc<dyn AfterHook<R>>) {
        self.after.add(hook);
    }

    pub fn add_after_for(&mut self, id: impl Into<String>, hook: Arc<dyn AfterHook<R>>) {
        self.after.add_for(id, hook);
    }

    pub fn add_wrap(&mut self, hook: Arc<dyn WrapHook<R>>) {
        self.wrap.add(hook);
    }

    pub fn add_wrap_for(&mut self, id: impl Into<String>, hook: Arc<dyn WrapHook<R>>) {
        self.wrap.add_for(id, hook);
    }

    /// Every id that has an id-scoped registration
    pub fn scoped_ids(&self) -> BTreeSet<&String> {
        self.before
            .ids()
            .chain(self.after.ids())
            .chain(self.wrap.ids())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.wrap.is_empty()
    }

    /// Run `action` for `id` through the chain
    ///
    /// Before hooks run first and each delta is merged into the working
    /// state with `schema`. The action then runs inside the wrap hooks,
    /// and the after hooks combine their results with the action's.
    pub async fn apply(
        &self,
        id: &str,
        state: &State,
        config: &RunConfig,
        action: Action<R>,
        schema: &Schema,
    ) -> Result<HookedCall<R>> {
        let mut working = state.clone();
        let mut before = Vec::new();
        for hook in self.before.calls_for(id) {
            let delta = hook.before(id, &working, config).await?;
            working = schema.merge(&working, &delta)?;
            before.push(delta);
        }

        let call = self.wrapped(id, action);
        let mut result = call(working.clone(), config.clone()).await?;

        for hook in self.after.calls_for(id) {
            let after = hook.after(id, &working, config, result.clone()).await?;
            result = result.merge_after(after);
        }

        Ok(HookedCall {
            before,
            state: working,
            result,
        })
    }

    /// Nest the wrap hooks around `action`, first registered outermost
    fn wrapped(&self, id: &str, action: Action<R>) -> Action<R> {
        let id: Arc<str> = Arc::from(id);
        self.wrap
            .calls_for(&id)
            .into_iter()
            .rev()
            .fold(action, |next, hook| {
                let id = id.clone();
                let link: Action<R> = Arc::new(
                    move |state: State, config: RunConfig| -> BoxFuture<'static, Result<R>> {
                        let hook = hook.clone();
                        let next = next.clone();
                        let id = id.clone();
                        Box::pin(async move { hook.wrap(&id, state, config, next).await })
                    },
                );
                link
            })
    }
}

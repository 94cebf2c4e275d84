//! Input of a graph run

use crate::error::Result;
use crate::state::{Delta, State};
use serde_json::Value;

/// What a run starts from
///
/// - `Args` starts a fresh run: the delta is merged into the schema's
///   initial state and execution begins at `__start__`.
/// - `Resume` continues the thread's latest checkpoint (or the one named
///   by the run config). The delta is merged into the checkpointed state
///   and is visible to the first resumed node as
///   [`RunConfig::resume_patch`](crate::config::RunConfig::resume_patch).
#[derive(Debug, Clone, PartialEq)]
pub enum GraphInput {
    Args(Delta),
    Resume(Delta),
}

impl GraphInput {
    pub fn args(delta: Delta) -> Self {
        Self::Args(delta)
    }

    /// Resume without changing the checkpointed state
    pub fn resume() -> Self {
        Self::Resume(Delta::new())
    }

    /// Resume after merging `patch` into the checkpointed state
    pub fn resume_with(patch: Delta) -> Self {
        Self::Resume(patch)
    }

    /// Fresh-run input from a JSON object, every key as a `Set` update
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self::Args(Delta::from_value(value)?))
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, Self::Resume(_))
    }

    pub fn delta(&self) -> &Delta {
        match self {
            Self::Args(delta) | Self::Resume(delta) => delta,
        }
    }
}

impl Default for GraphInput {
    fn default() -> Self {
        Self::Args(Delta::new())
    }
}

impl From<Delta> for GraphInput {
    fn from(delta: Delta) -> Self {
        Self::Args(delta)
    }
}

impl From<State> for GraphInput {
    fn from(state: State) -> Self {
        Self::Args(Delta::from_state(state))
    }
}

//! Edge commands
//!
//! A conditional edge evaluates to a [`Command`]: the routing label to
//! follow and an optional state update applied together with the
//! transition. Edge hooks see and may rewrite the command before the label
//! is resolved against the edge's declared targets.

use crate::state::Delta;

/// Routing decision of a conditional edge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// Routing label; resolved through the edge's label mapping
    pub goto: Option<String>,

    /// Update merged into state along with the transition
    pub update: Delta,
}

impl Command {
    /// Route to `label` without updating state
    pub fn goto(label: impl Into<String>) -> Self {
        Self {
            goto: Some(label.into()),
            update: Delta::new(),
        }
    }

    /// Update state without choosing a label
    pub fn update(update: Delta) -> Self {
        Self { goto: None, update }
    }

    pub fn with_update(mut self, update: Delta) -> Self {
        self.update = update;
        self
    }

    /// Combine with a later command: its label (when set) and its update
    /// keys win
    pub fn merged_with(self, later: Command) -> Command {
        Command {
            goto: later.goto.or(self.goto),
            update: self.update.merged_with(later.update),
        }
    }
}

//! Controller lifecycle edge table.
//!
//! ```text
//!  initial ──start──▶ pending ──complete──▶ done ◀──activate── missing
//!                       │  ▲                 │ └────missing──────▶ │
//!                     fail retry             └──────delete──┐      │
//!                       ▼  │                                ▼      │
//!                      failed ──────────delete────────▶ deleted ◀─delete
//! ```
//!
//! `deleted` is terminal: every action from it is rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Initial,
    Pending,
    Done,
    Missing,
    Failed,
    Deleted,
}

/// Something that moves a controller along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Complete,
    Fail,
    Missing,
    Activate,
    Retry,
    Delete,
}

/// Rejected (state, action) pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: cannot {action} a controller in state {from}")]
pub struct InvalidTransition {
    pub from: ControllerState,
    pub action: LifecycleAction,
}

impl ControllerState {
    pub const ALL: [ControllerState; 6] = [
        ControllerState::Initial,
        ControllerState::Pending,
        ControllerState::Done,
        ControllerState::Missing,
        ControllerState::Failed,
        ControllerState::Deleted,
    ];

    /// Target state for `action`, or the rejection.
    pub fn next(self, action: LifecycleAction) -> Result<ControllerState, InvalidTransition> {
        use ControllerState as S;
        use LifecycleAction as A;

        let next = match (self, action) {
            (S::Initial, A::Start) => S::Pending,
            (S::Pending, A::Complete) => S::Done,
            (S::Pending, A::Fail) => S::Failed,
            (S::Done, A::Missing) => S::Missing,
            (S::Missing, A::Activate) => S::Done,
            (S::Failed, A::Retry) => S::Pending,
            (S::Done | S::Missing | S::Failed, A::Delete) => S::Deleted,
            (from, action) => return Err(InvalidTransition { from, action }),
        };
        Ok(next)
    }

    pub fn can(self, action: LifecycleAction) -> bool {
        self.next(action).is_ok()
    }

    pub fn is_terminal(self) -> bool {
        self == ControllerState::Deleted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControllerState::Initial => "initial",
            ControllerState::Pending => "pending",
            ControllerState::Done => "done",
            ControllerState::Missing => "missing",
            ControllerState::Failed => "failed",
            ControllerState::Deleted => "deleted",
        }
    }

    /// Human label for UIs.
    pub fn display_name(self) -> &'static str {
        match self {
            ControllerState::Initial => "Initial",
            ControllerState::Pending => "Pending",
            ControllerState::Done => "Done",
            ControllerState::Missing => "Missing",
            ControllerState::Failed => "Failed",
            ControllerState::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 7] = [
        LifecycleAction::Start,
        LifecycleAction::Complete,
        LifecycleAction::Fail,
        LifecycleAction::Missing,
        LifecycleAction::Activate,
        LifecycleAction::Retry,
        LifecycleAction::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Complete => "complete",
            LifecycleAction::Fail => "fail",
            LifecycleAction::Missing => "missing",
            LifecycleAction::Activate => "activate",
            LifecycleAction::Retry => "retry",
            LifecycleAction::Delete => "delete",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Lifecycle action and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StackflowError;

/// The lifecycle operation applied to a stack or resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Bring resources into existence.
    Create,
    /// Converge existing resources onto a new template.
    Update,
    /// Remove resources.
    Delete,
    /// Undo a failed create or update.
    Rollback,
    /// Suspend resources.
    Suspend,
    /// Resume suspended resources.
    Resume,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Rollback,
        Self::Suspend,
        Self::Resume,
    ];

    /// Returns the upper-case wire name (e.g. `DELETE`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Rollback => "ROLLBACK",
            Self::Suspend => "SUSPEND",
            Self::Resume => "RESUME",
        }
    }

    /// Returns the capitalised name used in human readable reasons.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Rollback => "Rollback",
            Self::Suspend => "Suspend",
            Self::Resume => "Resume",
        }
    }

    /// Reason recorded when the operation exceeds its deadline.
    #[must_use]
    pub fn timed_out_reason(&self) -> String {
        format!("{} timed out", self.title())
    }

    /// Returns true if the action walks the dependency graph in reverse.
    #[must_use]
    pub const fn is_reverse(&self) -> bool {
        matches!(self, Self::Delete | Self::Rollback)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = StackflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| StackflowError::InvalidAction(s.to_string()))
    }
}

/// Progress of the current action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The action is running.
    InProgress,
    /// The action finished successfully.
    Complete,
    /// The action finished unsuccessfully.
    Failed,
}

impl Status {
    /// Returns the upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `(action, status)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackState {
    /// The current action.
    pub action: Action,
    /// Progress of that action.
    pub status: Status,
}

impl StackState {
    /// Creates a new state pair.
    #[must_use]
    pub const fn new(action: Action, status: Status) -> Self {
        Self { action, status }
    }

    /// Returns true if the state is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<(Action, Status)> for StackState {
    fn from((action, status): (Action, Status)) -> Self {
        Self::new(action, status)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action, self.status)
    }
}

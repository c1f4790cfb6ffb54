//! Stack and resource state change events.
//!
//! Every persisted state transition is also emitted as a [`StackEvent`] to
//! the configured [`EventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Action, StackState, Status};
use crate::store::StackId;

/// Event type for stack level transitions.
pub const STACK_STATE: &str = "stack.state";

/// Event type for resource level transitions.
pub const RESOURCE_STATE: &str = "resource.state";

/// A single state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEvent {
    /// [`STACK_STATE`] or [`RESOURCE_STATE`].
    pub event_type: String,
    /// Stack the event belongs to.
    pub stack_id: StackId,
    /// Resource name for resource events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// New action.
    pub action: Action,
    /// New status.
    pub status: Status,
    /// Reason attached to the transition.
    pub reason: String,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl StackEvent {
    /// A stack level transition.
    #[must_use]
    pub fn stack(stack_id: StackId, state: StackState, reason: impl Into<String>) -> Self {
        Self {
            event_type: STACK_STATE.to_string(),
            stack_id,
            resource: None,
            action: state.action,
            status: state.status,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// A resource level transition.
    #[must_use]
    pub fn resource(
        stack_id: StackId,
        resource: impl Into<String>,
        state: StackState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_type: RESOURCE_STATE.to_string(),
            stack_id,
            resource: Some(resource.into()),
            action: state.action,
            status: state.status,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// The transition as a state pair.
    #[must_use]
    pub const fn state(&self) -> StackState {
        StackState::new(self.action, self.status)
    }
}

//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::Debug;
use tracing::{debug, info, Level};

use super::StackEvent;
use crate::core::StackState;

/// Receives state transition events.
#[async_trait]
pub trait EventSink: Send + Sync + Debug {
    /// Emits an event.
    async fn emit(&self, event: &StackEvent);

    /// Emits an event without awaiting. Must never fail.
    fn try_emit(&self, event: &StackEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StackEvent) {}

    fn try_emit(&self, _event: &StackEvent) {}
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &StackEvent) {
        let resource = event.resource.as_deref().unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                stack_id = %event.stack_id,
                resource = %resource,
                state = %event.state(),
                reason = %event.reason,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                stack_id = %event.stack_id,
                resource = %resource,
                state = %event.state(),
                reason = %event.reason,
                "Event: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StackEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StackEvent) {
        self.log_event(event);
    }
}

/// Keeps every event in memory, for inspection in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StackEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<StackEvent> {
        self.events.read().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events of one type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<StackEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Stack level states in emission order.
    #[must_use]
    pub fn stack_states(&self) -> Vec<StackState> {
        self.events
            .read()
            .iter()
            .filter(|e| e.resource.is_none())
            .map(StackEvent::state)
            .collect()
    }

    /// States of one resource in emission order.
    #[must_use]
    pub fn resource_states(&self, resource: &str) -> Vec<StackState> {
        self.events
            .read()
            .iter()
            .filter(|e| e.resource.as_deref() == Some(resource))
            .map(StackEvent::state)
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StackEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StackEvent) {
        self.events.write().push(event.clone());
    }
}

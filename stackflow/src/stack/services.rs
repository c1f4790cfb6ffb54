//! Collaborators shared by every stack operation.

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::events::{EventSink, NoOpEventSink};
use crate::identity::IdentityService;
use crate::resource::HandlerRegistry;
use crate::scheduler::{Clock, SystemClock};
use crate::store::StackStore;

/// Everything a [`Stack`](super::Stack) needs from the outside world.
#[derive(Clone)]
pub struct StackServices {
    /// Engine settings.
    pub config: Arc<EngineConfig>,
    /// Record store.
    pub store: Arc<dyn StackStore>,
    /// Identity and project service.
    pub identity: Arc<dyn IdentityService>,
    /// Resource type handlers.
    pub handlers: Arc<HandlerRegistry>,
    /// State change events.
    pub events: Arc<dyn EventSink>,
    /// Clock used for operation timeouts.
    pub clock: Arc<dyn Clock>,
}

impl StackServices {
    /// Creates services with no event sink and the system clock.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn StackStore>,
        identity: Arc<dyn IdentityService>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            identity,
            handlers,
            events: Arc::new(NoOpEventSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl fmt::Debug for StackServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackServices")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

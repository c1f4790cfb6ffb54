//! # Stackflow
//!
//! A dependency-ordered orchestration engine for stacks of infrastructure
//! resources.
//!
//! Stackflow drives a declared collection of resources through create,
//! update, delete and rollback with support for:
//!
//! - **Dependency ordering**: resources run after everything they depend on,
//!   and are deleted before it
//! - **Concurrent branches**: independent resources progress together under
//!   a poll driven scheduler
//! - **Deadlines**: every operation is bounded by the stack timeout and
//!   cancels in-flight work cooperatively when it expires
//! - **Failure aggregation**: one deterministic status reason per operation,
//!   with automatic rollback when enabled
//! - **Credential cleanup**: root stacks revoke their trust and tear down
//!   their project on delete
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackflow::prelude::*;
//!
//! let handlers = Arc::new(HandlerRegistry::new());
//! handlers.register("Generic", Arc::new(MyHandler));
//!
//! let services = StackServices::new(EngineConfig::new(), store, identity, handlers);
//! let template = StackTemplate::new()
//!     .with_resource(ResourceDefinition::new("net", "Generic"))
//!     .with_resource(ResourceDefinition::new("server", "Generic").depends_on("net"));
//!
//! let mut stack = Stack::new(context, "web", template, services);
//! stack.create().await?;
//! stack.delete().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod failure;
pub mod graph;
pub mod identity;
pub mod observability;
pub mod resource;
pub mod scheduler;
pub mod stack;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{DeferredAuthMethod, EngineConfig};
    pub use crate::context::RequestContext;
    pub use crate::core::{Action, StackState, Status};
    pub use crate::errors::{
        GraphCycleError, HandlerError, IdentityError, StackflowError, StoreError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::failure::{FailureCollector, FailureRecord};
    pub use crate::graph::{Dependencies, Direction};
    pub use crate::identity::{IdentityClient, IdentityService, TrustContext};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::resource::{
        HandlerProgress, HandlerRegistry, ResourceDefinition, ResourceHandler, StackTemplate,
    };
    pub use crate::scheduler::{Clock, DependencyTaskGroup, SystemClock, Task, TaskStep};
    pub use crate::stack::{DeleteOptions, Stack, StackServices};
    pub use crate::store::{InMemoryStore, StackId, StackStore};
    pub use std::sync::Arc;
}

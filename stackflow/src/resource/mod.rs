//! Resources: declarations, type handlers and the per-resource task.

mod definition;
mod handler;
mod registry;
mod task;

pub use definition::{ResourceDefinition, StackTemplate};
pub use handler::{HandlerProgress, ResourceHandler};
pub use registry::HandlerRegistry;
pub use task::{ResourceOp, ResourceTask, ResourceTaskContext};

//! Resource action handlers.

use async_trait::async_trait;
use std::fmt::Debug;

use super::ResourceDefinition;
use crate::core::Action;
use crate::errors::HandlerError;

/// Result of one handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerProgress {
    /// The action finished.
    Complete,
    /// The action was accepted; poll [`ResourceHandler::check_complete`].
    InProgress,
}

/// Type specific implementation of resource actions.
///
/// Handlers are shared across stacks and must not keep per-stack state
/// outside of the resource record.
#[async_trait]
pub trait ResourceHandler: Send + Sync + Debug {
    /// Creates the resource.
    async fn handle_create(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError>;

    /// Moves the resource from `previous` to `resource`.
    async fn handle_update(
        &self,
        resource: &ResourceDefinition,
        previous: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError>;

    /// Deletes the resource.
    async fn handle_delete(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError>;

    /// Polls an action that returned [`HandlerProgress::InProgress`].
    async fn check_complete(
        &self,
        action: Action,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        let _ = (action, resource);
        Ok(HandlerProgress::Complete)
    }
}

//! Identity and project services.
//!
//! The engine never caches an identity client: every cleanup attempt asks
//! the [`IdentityService`] for a fresh client bound to the context it needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::errors::IdentityError;

/// A delegation created on behalf of the stack owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustContext {
    /// Trust identifier.
    pub trust_id: String,
    /// User who granted the trust.
    pub trustor_user_id: String,
}

/// Client bound to one request context.
#[async_trait]
pub trait IdentityClient: Send + Sync + Debug {
    /// Creates a trust delegating the caller's roles to the engine.
    async fn create_trust_context(&self) -> Result<TrustContext, IdentityError>;

    /// Revokes a trust.
    async fn delete_trust(&self, trust_id: &str) -> Result<(), IdentityError>;

    /// Deletes the per-stack user project.
    async fn delete_stack_domain_project(&self, project_id: &str) -> Result<(), IdentityError>;
}

/// Resolves identity clients for request contexts.
pub trait IdentityService: Send + Sync + Debug {
    /// Returns a client acting as `context`.
    fn client_for(
        &self,
        context: &RequestContext,
    ) -> Result<Arc<dyn IdentityClient>, IdentityError>;
}

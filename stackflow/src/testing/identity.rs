//! Fake identity service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::errors::IdentityError;
use crate::identity::{IdentityClient, IdentityService, TrustContext};

#[derive(Debug, Default)]
struct IdentityState {
    contexts: Vec<RequestContext>,
    created_trusts: Vec<String>,
    deleted_trusts: Vec<String>,
    deleted_projects: Vec<String>,
    client_error: Option<IdentityError>,
    trust_delete_error: Option<IdentityError>,
    project_delete_error: Option<IdentityError>,
}

/// Identity service recording every client request.
///
/// Clones share state, so a test can keep one handle and give another to
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct FakeIdentityService {
    state: Arc<Mutex<IdentityState>>,
}

impl FakeIdentityService {
    /// Creates a service where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `client_for` fail.
    pub fn fail_client(&self, error: IdentityError) {
        self.state.lock().client_error = Some(error);
    }

    /// Makes trust deletion fail.
    pub fn fail_delete_trust(&self, error: IdentityError) {
        self.state.lock().trust_delete_error = Some(error);
    }

    /// Makes project deletion fail.
    pub fn fail_delete_project(&self, error: IdentityError) {
        self.state.lock().project_delete_error = Some(error);
    }

    /// Number of clients requested.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.state.lock().contexts.len()
    }

    /// Contexts clients were requested for, in order.
    #[must_use]
    pub fn contexts(&self) -> Vec<RequestContext> {
        self.state.lock().contexts.clone()
    }

    /// Trusts created so far.
    #[must_use]
    pub fn created_trusts(&self) -> Vec<String> {
        self.state.lock().created_trusts.clone()
    }

    /// Trusts deleted so far.
    #[must_use]
    pub fn deleted_trusts(&self) -> Vec<String> {
        self.state.lock().deleted_trusts.clone()
    }

    /// Projects deleted so far.
    #[must_use]
    pub fn deleted_projects(&self) -> Vec<String> {
        self.state.lock().deleted_projects.clone()
    }
}

impl IdentityService for FakeIdentityService {
    fn client_for(
        &self,
        context: &RequestContext,
    ) -> Result<Arc<dyn IdentityClient>, IdentityError> {
        let mut state = self.state.lock();
        state.contexts.push(context.clone());
        if let Some(error) = &state.client_error {
            return Err(error.clone());
        }
        Ok(Arc::new(FakeIdentityClient {
            context: context.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct FakeIdentityClient {
    context: RequestContext,
    state: Arc<Mutex<IdentityState>>,
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn create_trust_context(&self) -> Result<TrustContext, IdentityError> {
        let mut state = self.state.lock();
        let trust_id = format!("trust-{}", state.created_trusts.len() + 1);
        state.created_trusts.push(trust_id.clone());
        Ok(TrustContext {
            trust_id,
            trustor_user_id: self
                .context
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
        })
    }

    async fn delete_trust(&self, trust_id: &str) -> Result<(), IdentityError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.trust_delete_error {
            return Err(error.clone());
        }
        state.deleted_trusts.push(trust_id.to_string());
        Ok(())
    }

    async fn delete_stack_domain_project(&self, project_id: &str) -> Result<(), IdentityError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.project_delete_error {
            return Err(error.clone());
        }
        state.deleted_projects.push(project_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_contexts_and_trusts() {
        let service = FakeIdentityService::new();
        let ctx = RequestContext::new().with_user_id("thetrustor");

        let client = service.client_for(&ctx).unwrap();
        let trust = client.create_trust_context().await.unwrap();
        client.delete_trust(&trust.trust_id).await.unwrap();

        assert_eq!(trust.trustor_user_id, "thetrustor");
        assert_eq!(service.client_count(), 1);
        assert_eq!(service.contexts()[0], ctx);
        assert_eq!(service.deleted_trusts(), vec![trust.trust_id]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let service = FakeIdentityService::new();
        service.fail_delete_project(IdentityError::Forbidden("no".to_string()));

        let client = service.client_for(&RequestContext::new()).unwrap();
        let err = client.delete_stack_domain_project("p1").await.unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: no");
        assert!(service.deleted_projects().is_empty());

        service.fail_client(IdentityError::Unexpected("down".to_string()));
        assert!(service.client_for(&RequestContext::new()).is_err());
        assert_eq!(service.client_count(), 2);
    }
}

//! Store fault injection and stack assertions.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Action, StackState, Status};
use crate::errors::StoreError;
use crate::stack::Stack;
use crate::store::{
    CredsId, InMemoryStore, ResourceRecord, StackId, StackRecord, StackStore, UserCreds,
};

/// Asserts that a stack is in the given state.
///
/// # Panics
///
/// Panics if the state differs.
pub fn assert_state(stack: &Stack, action: Action, status: Status) {
    assert_eq!(
        stack.state(),
        Some(StackState::new(action, status)),
        "unexpected state, reason: {}",
        stack.status_reason()
    );
}

/// An [`InMemoryStore`] that can be told to fail selected calls.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    user_creds_get_error: Mutex<Option<StoreError>>,
}

impl FaultyStore {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            user_creds_get_error: Mutex::new(None),
        }
    }

    /// Makes every `user_creds_get` fail with `error`.
    pub fn fail_user_creds_get(&self, error: StoreError) {
        *self.user_creds_get_error.lock() = Some(error);
    }
}

#[async_trait]
impl StackStore for FaultyStore {
    async fn stack_get(
        &self,
        id: StackId,
        show_deleted: bool,
    ) -> Result<Option<StackRecord>, StoreError> {
        self.inner.stack_get(id, show_deleted).await
    }

    async fn stack_store(&self, record: StackRecord) -> Result<StackId, StoreError> {
        self.inner.stack_store(record).await
    }

    async fn stack_mark_deleted(&self, id: StackId) -> Result<(), StoreError> {
        self.inner.stack_mark_deleted(id).await
    }

    async fn stack_delete(&self, id: StackId) -> Result<(), StoreError> {
        self.inner.stack_delete(id).await
    }

    async fn resource_get(
        &self,
        stack_id: StackId,
        name: &str,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        self.inner.resource_get(stack_id, name).await
    }

    async fn resource_store(&self, record: ResourceRecord) -> Result<(), StoreError> {
        self.inner.resource_store(record).await
    }

    async fn resource_delete(&self, stack_id: StackId, name: &str) -> Result<(), StoreError> {
        self.inner.resource_delete(stack_id, name).await
    }

    async fn resources_for_stack(
        &self,
        stack_id: StackId,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        self.inner.resources_for_stack(stack_id).await
    }

    async fn user_creds_create(&self, creds: UserCreds) -> Result<CredsId, StoreError> {
        self.inner.user_creds_create(creds).await
    }

    async fn user_creds_get(&self, id: CredsId) -> Result<Option<UserCreds>, StoreError> {
        let injected = self.user_creds_get_error.lock().clone();
        match injected {
            Some(error) => Err(error),
            None => self.inner.user_creds_get(id).await,
        }
    }

    async fn user_creds_delete(&self, id: CredsId) -> Result<(), StoreError> {
        self.inner.user_creds_delete(id).await
    }
}

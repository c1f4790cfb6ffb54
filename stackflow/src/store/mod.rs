//! Record store.
//!
//! Persists stacks, their resources and the credentials captured at stack
//! creation. [`InMemoryStore`] is the reference backend.

mod memory;
mod records;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::StoreError;

pub use memory::InMemoryStore;
pub use records::{CredsId, ResourceRecord, StackId, StackRecord, UserCreds};

/// Storage backend for stack records.
#[async_trait]
pub trait StackStore: Send + Sync + Debug {
    /// Loads a stack; soft deleted stacks are visible only with `show_deleted`.
    async fn stack_get(
        &self,
        id: StackId,
        show_deleted: bool,
    ) -> Result<Option<StackRecord>, StoreError>;

    /// Inserts or replaces a stack record.
    async fn stack_store(&self, record: StackRecord) -> Result<StackId, StoreError>;

    /// Soft deletes a stack.
    async fn stack_mark_deleted(&self, id: StackId) -> Result<(), StoreError>;

    /// Removes a stack record entirely.
    async fn stack_delete(&self, id: StackId) -> Result<(), StoreError>;

    /// Loads one resource record.
    async fn resource_get(
        &self,
        stack_id: StackId,
        name: &str,
    ) -> Result<Option<ResourceRecord>, StoreError>;

    /// Inserts or replaces a resource record.
    async fn resource_store(&self, record: ResourceRecord) -> Result<(), StoreError>;

    /// Removes a resource record.
    async fn resource_delete(&self, stack_id: StackId, name: &str) -> Result<(), StoreError>;

    /// All resource records of a stack, in name order.
    async fn resources_for_stack(&self, stack_id: StackId)
        -> Result<Vec<ResourceRecord>, StoreError>;

    /// Saves credentials.
    async fn user_creds_create(&self, creds: UserCreds) -> Result<CredsId, StoreError>;

    /// Loads credentials.
    async fn user_creds_get(&self, id: CredsId) -> Result<Option<UserCreds>, StoreError>;

    /// Removes credentials.
    async fn user_creds_delete(&self, id: CredsId) -> Result<(), StoreError>;
}

//! In-memory record store.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{CredsId, ResourceRecord, StackId, StackRecord, StackStore, UserCreds};
use crate::errors::StoreError;

#[derive(Debug, Default)]
struct Tables {
    stacks: HashMap<StackId, StackRecord>,
    resources: BTreeMap<(StackId, String), ResourceRecord>,
    user_creds: HashMap<CredsId, UserCreds>,
}

/// Store keeping every record in process memory.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stacks, including soft deleted ones.
    #[must_use]
    pub fn stack_count(&self) -> usize {
        self.tables.lock().stacks.len()
    }

    /// Number of stored credential records.
    #[must_use]
    pub fn user_creds_count(&self) -> usize {
        self.tables.lock().user_creds.len()
    }
}

#[async_trait]
impl StackStore for InMemoryStore {
    async fn stack_get(
        &self,
        id: StackId,
        show_deleted: bool,
    ) -> Result<Option<StackRecord>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .stacks
            .get(&id)
            .filter(|record| show_deleted || !record.is_deleted())
            .cloned())
    }

    async fn stack_store(&self, record: StackRecord) -> Result<StackId, StoreError> {
        let id = record.id;
        self.tables.lock().stacks.insert(id, record);
        Ok(id)
    }

    async fn stack_mark_deleted(&self, id: StackId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let record = tables
            .stacks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Stack", id.to_string()))?;
        record.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn stack_delete(&self, id: StackId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables
            .stacks
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("Stack", id.to_string()))?;
        tables.resources.retain(|(stack_id, _), _| *stack_id != id);
        Ok(())
    }

    async fn resource_get(
        &self,
        stack_id: StackId,
        name: &str,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .resources
            .get(&(stack_id, name.to_string()))
            .cloned())
    }

    async fn resource_store(&self, record: ResourceRecord) -> Result<(), StoreError> {
        let key = (record.stack_id, record.name.clone());
        self.tables.lock().resources.insert(key, record);
        Ok(())
    }

    async fn resource_delete(&self, stack_id: StackId, name: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .resources
            .remove(&(stack_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("Resource", name))
    }

    async fn resources_for_stack(
        &self,
        stack_id: StackId,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .resources
            .iter()
            .filter(|((id, _), _)| *id == stack_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn user_creds_create(&self, creds: UserCreds) -> Result<CredsId, StoreError> {
        let id = CredsId::new();
        self.tables.lock().user_creds.insert(id, creds);
        Ok(id)
    }

    async fn user_creds_get(&self, id: CredsId) -> Result<Option<UserCreds>, StoreError> {
        Ok(self.tables.lock().user_creds.get(&id).cloned())
    }

    async fn user_creds_delete(&self, id: CredsId) -> Result<(), StoreError> {
        self.tables
            .lock()
            .user_creds
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("UserCreds", id.to_string()))
    }
}

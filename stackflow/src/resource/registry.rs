//! Handler registry keyed by resource type name.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::ResourceHandler;
use crate::errors::StackflowError;

/// Maps resource type names to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ResourceHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the type.
    pub fn register(&self, type_name: impl Into<String>, handler: Arc<dyn ResourceHandler>) {
        self.handlers.write().insert(type_name.into(), handler);
    }

    /// Registers a handler, builder style.
    #[must_use]
    pub fn with_handler(
        self,
        type_name: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        self.register(type_name, handler);
        self
    }

    /// Looks up the handler for a type.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.read().get(type_name).cloned()
    }

    /// Looks up the handler for a resource, failing on unknown types.
    pub fn resolve(
        &self,
        resource: &str,
        type_name: &str,
    ) -> Result<Arc<dyn ResourceHandler>, StackflowError> {
        self.get(type_name)
            .ok_or_else(|| StackflowError::UnknownResourceType {
                resource: resource.to_string(),
                type_name: type_name.to_string(),
            })
    }

    /// Returns true if a handler is registered for the type.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.read().contains_key(type_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

//! Resource handlers with scripted behaviour.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::Action;
use crate::errors::HandlerError;
use crate::resource::{HandlerProgress, ResourceDefinition, ResourceHandler};

/// Log of handler calls as `(action, resource)` pairs.
#[derive(Debug, Default)]
struct CallLog {
    calls: Mutex<Vec<(Action, String)>>,
}

impl CallLog {
    fn push(&self, action: Action, resource: &ResourceDefinition) {
        self.calls.lock().push((action, resource.name.clone()));
    }

    fn count(&self, action: Action) -> usize {
        self.calls.lock().iter().filter(|(a, _)| *a == action).count()
    }

    fn resources(&self, action: Action) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn total(&self) -> usize {
        self.calls.lock().len()
    }
}

/// A handler for which every action completes immediately.
#[derive(Debug, Default)]
pub struct GenericResourceHandler {
    log: CallLog,
}

impl GenericResourceHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls for an action.
    #[must_use]
    pub fn calls(&self, action: Action) -> usize {
        self.log.count(action)
    }

    /// Resources acted on, in call order.
    #[must_use]
    pub fn resources(&self, action: Action) -> Vec<String> {
        self.log.resources(action)
    }

    /// Number of calls for any action.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.log.total()
    }
}

#[async_trait]
impl ResourceHandler for GenericResourceHandler {
    async fn handle_create(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.log.push(Action::Create, resource);
        Ok(HandlerProgress::Complete)
    }

    async fn handle_update(
        &self,
        resource: &ResourceDefinition,
        _previous: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.log.push(Action::Update, resource);
        Ok(HandlerProgress::Complete)
    }

    async fn handle_delete(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.log.push(Action::Delete, resource);
        Ok(HandlerProgress::Complete)
    }
}

/// A handler that fails one action, optionally only for one resource.
#[derive(Debug)]
pub struct FailingHandler {
    action: Action,
    error: HandlerError,
    only: Option<String>,
    log: CallLog,
}

impl FailingHandler {
    /// Fails `action` for every resource with `error`.
    #[must_use]
    pub fn new(action: Action, error: HandlerError) -> Self {
        Self {
            action,
            error,
            only: None,
            log: CallLog::default(),
        }
    }

    /// Restricts the failure to one resource.
    #[must_use]
    pub fn only(mut self, resource: impl Into<String>) -> Self {
        self.only = Some(resource.into());
        self
    }

    /// Number of calls for an action.
    #[must_use]
    pub fn calls(&self, action: Action) -> usize {
        self.log.count(action)
    }

    /// Resources acted on, in call order.
    #[must_use]
    pub fn resources(&self, action: Action) -> Vec<String> {
        self.log.resources(action)
    }

    fn outcome(
        &self,
        action: Action,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.log.push(action, resource);
        let targeted = self.only.as_ref().map_or(true, |only| *only == resource.name);
        if action == self.action && targeted {
            Err(self.error.clone())
        } else {
            Ok(HandlerProgress::Complete)
        }
    }
}

#[async_trait]
impl ResourceHandler for FailingHandler {
    async fn handle_create(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.outcome(Action::Create, resource)
    }

    async fn handle_update(
        &self,
        resource: &ResourceDefinition,
        _previous: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.outcome(Action::Update, resource)
    }

    async fn handle_delete(
        &self,
        resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.outcome(Action::Delete, resource)
    }
}

/// A handler whose `action` never completes.
#[derive(Debug)]
pub struct StuckHandler {
    action: Action,
    checks: AtomicUsize,
}

impl StuckHandler {
    /// Creates a handler stuck on `action`.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of completion checks so far.
    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    fn progress(&self, action: Action) -> HandlerProgress {
        if action == self.action {
            HandlerProgress::InProgress
        } else {
            HandlerProgress::Complete
        }
    }
}

#[async_trait]
impl ResourceHandler for StuckHandler {
    async fn handle_create(
        &self,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(self.progress(Action::Create))
    }

    async fn handle_update(
        &self,
        _resource: &ResourceDefinition,
        _previous: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(self.progress(Action::Update))
    }

    async fn handle_delete(
        &self,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(self.progress(Action::Delete))
    }

    async fn check_complete(
        &self,
        action: Action,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.progress(action))
    }
}

/// A handler that needs `checks` completion checks before any action
/// finishes.
#[derive(Debug)]
pub struct PollingHandler {
    needed: usize,
    checks: AtomicUsize,
}

impl PollingHandler {
    /// Creates a handler completing on the `needed`-th check.
    #[must_use]
    pub const fn new(needed: usize) -> Self {
        Self {
            needed,
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of completion checks so far.
    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceHandler for PollingHandler {
    async fn handle_create(
        &self,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(HandlerProgress::InProgress)
    }

    async fn handle_update(
        &self,
        _resource: &ResourceDefinition,
        _previous: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(HandlerProgress::InProgress)
    }

    async fn handle_delete(
        &self,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        Ok(HandlerProgress::InProgress)
    }

    async fn check_complete(
        &self,
        _action: Action,
        _resource: &ResourceDefinition,
    ) -> Result<HandlerProgress, HandlerError> {
        let done = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if done >= self.needed {
            Ok(HandlerProgress::Complete)
        } else {
            Ok(HandlerProgress::InProgress)
        }
    }
}

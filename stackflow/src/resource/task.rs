//! Per-resource task run by the dependency scheduler.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{HandlerProgress, ResourceDefinition, ResourceHandler};
use crate::cancellation::CancellationToken;
use crate::core::{Action, StackState, Status};
use crate::errors::HandlerError;
use crate::events::{EventSink, StackEvent};
use crate::scheduler::{Task, TaskStep};
use crate::store::{ResourceRecord, StackId, StackStore};

/// What a [`ResourceTask`] does to its resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOp {
    /// Create the resource.
    Create,
    /// Move the resource from `previous` to the task's definition.
    Update {
        /// The definition the resource currently has.
        previous: ResourceDefinition,
    },
    /// Delete the resource.
    Delete,
    /// Leave the resource alone.
    Keep,
}

impl ResourceOp {
    fn action(&self) -> Action {
        match self {
            Self::Create => Action::Create,
            Self::Update { .. } | Self::Keep => Action::Update,
            Self::Delete => Action::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Polling,
    Done,
}

/// Shared collaborators for resource tasks of one stack.
#[derive(Clone)]
pub struct ResourceTaskContext {
    /// Owning stack.
    pub stack_id: StackId,
    /// Record store.
    pub store: Arc<dyn StackStore>,
    /// Event sink.
    pub events: Arc<dyn EventSink>,
    /// Delay between completion checks.
    pub check_interval: Duration,
}

/// Drives one resource through one action.
///
/// The first step checks for an existing record, persists the
/// `IN_PROGRESS` marker and calls the handler. Handlers that answer
/// [`HandlerProgress::InProgress`] are polled through
/// [`ResourceHandler::check_complete`] on later steps.
pub struct ResourceTask {
    definition: ResourceDefinition,
    op: ResourceOp,
    action: Action,
    handler: Arc<dyn ResourceHandler>,
    ctx: ResourceTaskContext,
    phase: Phase,
}

impl ResourceTask {
    /// Creates a task.
    #[must_use]
    pub fn new(
        definition: ResourceDefinition,
        op: ResourceOp,
        handler: Arc<dyn ResourceHandler>,
        ctx: ResourceTaskContext,
    ) -> Self {
        let action = op.action();
        Self {
            definition,
            op,
            action,
            handler,
            ctx,
            phase: Phase::Start,
        }
    }

    async fn start(&mut self, token: &CancellationToken) -> TaskStep {
        let existing = match self
            .ctx
            .store
            .resource_get(self.ctx.stack_id, &self.definition.name)
            .await
        {
            Ok(existing) => existing,
            Err(e) => return self.fail(HandlerError::new("StoreError", e.to_string())).await,
        };

        let skip = match (&self.op, &existing) {
            (ResourceOp::Delete, existing) => existing.is_none(),
            (_, Some(record)) => record.matches(&self.definition),
            (_, None) => false,
        };
        if skip {
            debug!(resource = %self.definition.name, action = %self.action, "Nothing to do");
            self.phase = Phase::Done;
            return TaskStep::Complete;
        }

        if matches!(self.op, ResourceOp::Update { .. } | ResourceOp::Keep) {
            self.reconcile(existing.as_ref());
        }

        if let Err(step) = self.record(Status::InProgress, "state changed").await {
            return step;
        }

        let handler = Arc::clone(&self.handler);
        let definition = self.definition.clone();
        let op = self.op.clone();
        let action = self.action;
        let call = async move {
            match (op, action) {
                (ResourceOp::Update { previous }, Action::Update) => {
                    handler.handle_update(&definition, &previous).await
                }
                (ResourceOp::Delete, _) => handler.handle_delete(&definition).await,
                _ => handler.handle_create(&definition).await,
            }
        };

        let progress = tokio::select! {
            () = token.cancelled() => return TaskStep::Cancelled,
            progress = call => progress,
        };
        self.settle(progress).await
    }

    /// Picks the real operation for a resource the template wants in place
    /// but whose record is missing, failed or out of date.
    fn reconcile(&mut self, existing: Option<&ResourceRecord>) {
        match existing.filter(|record| record.is_created()) {
            None => {
                self.op = ResourceOp::Create;
                self.action = Action::Create;
            }
            Some(record) if self.op == ResourceOp::Keep => {
                let mut previous = self.definition.clone();
                previous.type_name.clone_from(&record.type_name);
                previous.properties.clone_from(&record.properties);
                self.op = ResourceOp::Update { previous };
            }
            Some(_) => {}
        }
    }

    async fn poll(&mut self, token: &CancellationToken) -> TaskStep {
        tokio::select! {
            () = token.cancelled() => return TaskStep::Cancelled,
            () = tokio::time::sleep(self.ctx.check_interval) => {}
        }

        let progress = tokio::select! {
            () = token.cancelled() => return TaskStep::Cancelled,
            progress = self.handler.check_complete(self.action, &self.definition) => progress,
        };
        self.settle(progress).await
    }

    async fn settle(&mut self, progress: Result<HandlerProgress, HandlerError>) -> TaskStep {
        match progress {
            Ok(HandlerProgress::InProgress) => {
                self.phase = Phase::Polling;
                TaskStep::Running
            }
            Ok(HandlerProgress::Complete) => {
                if let Err(step) = self.record(Status::Complete, "state changed").await {
                    return step;
                }
                if self.action == Action::Delete {
                    if let Err(e) = self
                        .ctx
                        .store
                        .resource_delete(self.ctx.stack_id, &self.definition.name)
                        .await
                    {
                        if !e.is_not_found() {
                            return self.fail(HandlerError::new("StoreError", e.to_string())).await;
                        }
                    }
                }
                self.phase = Phase::Done;
                TaskStep::Complete
            }
            Err(e) => self.fail(e).await,
        }
    }

    async fn fail(&mut self, error: HandlerError) -> TaskStep {
        self.phase = Phase::Done;
        if let Err(step) = self.record(Status::Failed, error.to_string()).await {
            warn!(resource = %self.definition.name, "Could not persist failure: {:?}", step);
        }
        TaskStep::Failed(error)
    }

    async fn record(&self, status: Status, reason: impl Into<String>) -> Result<(), TaskStep> {
        let state = StackState::new(self.action, status);
        let reason = reason.into();
        let record =
            ResourceRecord::new(self.ctx.stack_id, &self.definition, state, reason.clone());

        self.ctx
            .store
            .resource_store(record)
            .await
            .map_err(|e| TaskStep::Failed(HandlerError::new("StoreError", e.to_string())))?;

        debug!(resource = %self.definition.name, state = %state, "Resource state changed");
        self.ctx
            .events
            .emit(&StackEvent::resource(
                self.ctx.stack_id,
                self.definition.name.clone(),
                state,
                reason,
            ))
            .await;
        Ok(())
    }
}

impl fmt::Debug for ResourceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTask")
            .field("resource", &self.definition.name)
            .field("action", &self.action)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for ResourceTask {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn action(&self) -> Action {
        self.action
    }

    async fn resume(&mut self, token: &CancellationToken) -> TaskStep {
        if token.is_cancelled() {
            return TaskStep::Cancelled;
        }
        match self.phase {
            Phase::Start => self.start(token).await,
            Phase::Polling => self.poll(token).await,
            Phase::Done => TaskStep::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::store::InMemoryStore;
    use crate::testing::{FailingHandler, GenericResourceHandler, PollingHandler, StuckHandler};
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: InMemoryStore,
        events: Arc<CollectingEventSink>,
        ctx: ResourceTaskContext,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let events = Arc::new(CollectingEventSink::new());
        let ctx = ResourceTaskContext {
            stack_id: StackId::new(),
            store: Arc::new(store.clone()),
            events: events.clone(),
            check_interval: Duration::from_millis(1),
        };
        Fixture { store, events, ctx }
    }

    async fn drive(task: &mut ResourceTask, token: &CancellationToken) -> TaskStep {
        loop {
            let step = task.resume(token).await;
            if step.is_finished() {
                return step;
            }
        }
    }

    fn state(action: Action, status: Status) -> StackState {
        StackState::new(action, status)
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let f = fixture();
        let handler = Arc::new(GenericResourceHandler::new());
        let definition = ResourceDefinition::new("A", "Generic");
        let token = CancellationToken::new();

        let mut create = ResourceTask::new(
            definition.clone(),
            ResourceOp::Create,
            handler.clone(),
            f.ctx.clone(),
        );
        assert_eq!(drive(&mut create, &token).await, TaskStep::Complete);
        let record = f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().unwrap();
        assert_eq!(record.state(), state(Action::Create, Status::Complete));

        let mut delete =
            ResourceTask::new(definition, ResourceOp::Delete, handler.clone(), f.ctx.clone());
        assert_eq!(drive(&mut delete, &token).await, TaskStep::Complete);
        assert!(f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().is_none());

        assert_eq!(handler.calls(Action::Create), 1);
        assert_eq!(handler.calls(Action::Delete), 1);
        assert_eq!(
            f.events.resource_states("A"),
            vec![
                state(Action::Create, Status::InProgress),
                state(Action::Create, Status::Complete),
                state(Action::Delete, Status::InProgress),
                state(Action::Delete, Status::Complete),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_without_record_skips_handler() {
        let f = fixture();
        let handler = Arc::new(GenericResourceHandler::new());
        let mut task = ResourceTask::new(
            ResourceDefinition::new("A", "Generic"),
            ResourceOp::Delete,
            handler.clone(),
            f.ctx.clone(),
        );

        assert_eq!(drive(&mut task, &CancellationToken::new()).await, TaskStep::Complete);
        assert_eq!(handler.calls(Action::Delete), 0);
        assert!(f.events.is_empty());
    }

    #[tokio::test]
    async fn test_create_skips_matching_record() {
        let f = fixture();
        let handler = Arc::new(GenericResourceHandler::new());
        let definition = ResourceDefinition::new("A", "Generic");
        f.store
            .resource_store(ResourceRecord::new(
                f.ctx.stack_id,
                &definition,
                state(Action::Create, Status::Complete),
                "",
            ))
            .await
            .unwrap();

        let mut task =
            ResourceTask::new(definition, ResourceOp::Create, handler.clone(), f.ctx.clone());
        assert_eq!(drive(&mut task, &CancellationToken::new()).await, TaskStep::Complete);
        assert_eq!(handler.calls(Action::Create), 0);
    }

    #[tokio::test]
    async fn test_update_without_record_creates() {
        let f = fixture();
        let handler = Arc::new(GenericResourceHandler::new());
        let definition = ResourceDefinition::new("A", "Generic");
        let mut task = ResourceTask::new(
            definition.clone(),
            ResourceOp::Update { previous: definition },
            handler.clone(),
            f.ctx.clone(),
        );

        assert_eq!(drive(&mut task, &CancellationToken::new()).await, TaskStep::Complete);
        assert_eq!(task.action(), Action::Create);
        assert_eq!(handler.calls(Action::Create), 1);
        assert_eq!(handler.calls(Action::Update), 0);
    }

    fn sized(size: u32) -> ResourceDefinition {
        ResourceDefinition::new("A", "Generic").with_properties(serde_json::json!({ "size": size }))
    }

    async fn keep_with_record(
        f: &Fixture,
        record: Option<(&ResourceDefinition, StackState)>,
    ) -> Arc<GenericResourceHandler> {
        if let Some((stored, stored_state)) = record {
            f.store
                .resource_store(ResourceRecord::new(f.ctx.stack_id, stored, stored_state, ""))
                .await
                .unwrap();
        }
        let handler = Arc::new(GenericResourceHandler::new());
        let mut task = ResourceTask::new(
            sized(2),
            ResourceOp::Keep,
            handler.clone(),
            f.ctx.clone(),
        );
        assert_eq!(drive(&mut task, &CancellationToken::new()).await, TaskStep::Complete);
        handler
    }

    #[tokio::test]
    async fn test_keep_skips_only_matching_record() {
        let f = fixture();
        let current = sized(2);
        let stored = state(Action::Create, Status::Complete);
        let handler = keep_with_record(&f, Some((&current, stored))).await;

        assert_eq!(handler.total_calls(), 0);
        assert!(f.events.is_empty());
    }

    #[tokio::test]
    async fn test_keep_recreates_failed_or_missing_resource() {
        let f = fixture();
        let current = sized(2);
        let stored = state(Action::Create, Status::Failed);
        let handler = keep_with_record(&f, Some((&current, stored))).await;
        assert_eq!(handler.calls(Action::Create), 1);

        let f = fixture();
        let handler = keep_with_record(&f, None).await;
        assert_eq!(handler.calls(Action::Create), 1);
        let record = f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().unwrap();
        assert_eq!(record.state(), state(Action::Create, Status::Complete));
    }

    #[tokio::test]
    async fn test_keep_updates_stale_record() {
        let f = fixture();
        let stale = sized(1);
        let stored = state(Action::Update, Status::Failed);
        let handler = keep_with_record(&f, Some((&stale, stored))).await;

        assert_eq!(handler.calls(Action::Update), 1);
        assert_eq!(handler.calls(Action::Create), 0);
        let record = f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().unwrap();
        assert_eq!(record.state(), state(Action::Update, Status::Complete));
        assert_eq!(record.properties, serde_json::json!({"size": 2}));
    }

    #[tokio::test]
    async fn test_handler_failure_persisted() {
        let f = fixture();
        let handler = Arc::new(FailingHandler::new(Action::Create, HandlerError::exception("foo")));
        let mut task = ResourceTask::new(
            ResourceDefinition::new("A", "Generic"),
            ResourceOp::Create,
            handler,
            f.ctx.clone(),
        );

        let step = drive(&mut task, &CancellationToken::new()).await;
        assert_eq!(step, TaskStep::Failed(HandlerError::exception("foo")));

        let record = f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().unwrap();
        assert_eq!(record.state(), state(Action::Create, Status::Failed));
        assert_eq!(record.status_reason, "Exception: foo");
    }

    #[tokio::test]
    async fn test_polls_until_complete() {
        let f = fixture();
        let handler = Arc::new(PollingHandler::new(3));
        let mut task = ResourceTask::new(
            ResourceDefinition::new("A", "Generic"),
            ResourceOp::Create,
            handler.clone(),
            f.ctx.clone(),
        );
        let token = CancellationToken::new();

        assert_eq!(task.resume(&token).await, TaskStep::Running);
        assert_eq!(drive(&mut task, &token).await, TaskStep::Complete);
        assert_eq!(handler.checks(), 3);
    }

    #[tokio::test]
    async fn test_cancel_leaves_in_progress_marker() {
        let f = fixture();
        let definition = ResourceDefinition::new("A", "Generic");
        let handler = Arc::new(StuckHandler::new(Action::Create));
        let mut task = ResourceTask::new(definition, ResourceOp::Create, handler, f.ctx.clone());
        let token = CancellationToken::new();

        assert_eq!(task.resume(&token).await, TaskStep::Running);
        token.cancel("Create timed out");
        assert_eq!(task.resume(&token).await, TaskStep::Cancelled);

        let record = f.store.resource_get(f.ctx.stack_id, "A").await.unwrap().unwrap();
        assert_eq!(record.state(), state(Action::Create, Status::InProgress));
    }
}

//! The stack state machine.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::plan::Plan;
use super::StackServices;
use crate::cancellation::CancellationToken;
use crate::context::RequestContext;
use crate::core::{Action, StackState, Status};
use crate::errors::{HandlerError, StackflowError, StoreError};
use crate::events::StackEvent;
use crate::resource::{ResourceTask, ResourceTaskContext, StackTemplate};
use crate::scheduler::{DependencyTaskGroup, GroupOutcome, GroupPoll, Task, TaskStep, Timeout};
use crate::store::{CredsId, StackId, StackRecord, UserCreds};

/// How a top-level operation's scheduler runs ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// Every run completed.
    Complete,
    /// A resource failed or the operation timed out.
    Failed(String),
    /// The declaration was rejected before any resource was touched.
    Invalid(String),
}

/// A named collection of resources with one aggregate lifecycle state.
///
/// Operations take `&mut self`, so one stack instance runs at most one
/// top-level operation at a time.
#[derive(Debug)]
pub struct Stack {
    pub(crate) id: StackId,
    pub(crate) name: String,
    pub(crate) context: RequestContext,
    pub(crate) template: StackTemplate,
    pub(crate) state: Option<StackState>,
    pub(crate) status_reason: String,
    pub(crate) timeout_mins: Option<u64>,
    pub(crate) disable_rollback: bool,
    pub(crate) owner_id: Option<StackId>,
    pub(crate) user_creds_id: Option<CredsId>,
    pub(crate) stack_user_project_id: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) services: StackServices,
}

impl Stack {
    /// Creates an in-memory stack. Nothing is persisted until [`Stack::store`].
    #[must_use]
    pub fn new(
        context: RequestContext,
        name: impl Into<String>,
        template: StackTemplate,
        services: StackServices,
    ) -> Self {
        Self {
            id: StackId::new(),
            name: name.into(),
            context,
            template,
            state: None,
            status_reason: String::new(),
            timeout_mins: None,
            disable_rollback: true,
            owner_id: None,
            user_creds_id: None,
            stack_user_project_id: None,
            created_at: Utc::now(),
            updated_at: None,
            services,
        }
    }

    /// Marks the stack as nested under `owner_id`.
    #[must_use]
    pub fn with_owner_id(mut self, owner_id: StackId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Enables or disables automatic rollback.
    #[must_use]
    pub fn with_disable_rollback(mut self, disable_rollback: bool) -> Self {
        self.disable_rollback = disable_rollback;
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub fn with_timeout_mins(mut self, mins: u64) -> Self {
        self.timeout_mins = Some(mins);
        self
    }

    /// Sets the stack user project.
    #[must_use]
    pub fn with_stack_user_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.stack_user_project_id = Some(project_id.into());
        self
    }

    /// Loads a stored stack on behalf of `context`.
    pub async fn load(
        context: RequestContext,
        id: StackId,
        services: StackServices,
    ) -> Result<Self, StackflowError> {
        let record = services
            .store
            .stack_get(id, false)
            .await?
            .ok_or_else(|| StoreError::not_found("Stack", id.to_string()))?;

        Ok(Self {
            id: record.id,
            name: record.name,
            context,
            template: record.template,
            state: match (record.action, record.status) {
                (Some(action), Some(status)) => Some(StackState::new(action, status)),
                _ => None,
            },
            status_reason: record.status_reason,
            timeout_mins: record.timeout_mins,
            disable_rollback: record.disable_rollback,
            owner_id: record.owner_id,
            user_creds_id: record.user_creds_id,
            stack_user_project_id: record.stack_user_project_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            services,
        })
    }

    /// Stack identifier.
    #[must_use]
    pub const fn id(&self) -> StackId {
        self.id
    }

    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller context the stack was built or loaded with.
    #[must_use]
    pub const fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Declared resources.
    #[must_use]
    pub const fn template(&self) -> &StackTemplate {
        &self.template
    }

    /// Current `(action, status)`, unset until an operation begins.
    #[must_use]
    pub const fn state(&self) -> Option<StackState> {
        self.state
    }

    /// Reason attached to the current state.
    #[must_use]
    pub fn status_reason(&self) -> &str {
        &self.status_reason
    }

    /// Parent stack, for nested stacks.
    #[must_use]
    pub const fn owner_id(&self) -> Option<StackId> {
        self.owner_id
    }

    /// Returns true for a stack without an owner.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.owner_id.is_none()
    }

    /// Stored credentials.
    #[must_use]
    pub const fn user_creds_id(&self) -> Option<CredsId> {
        self.user_creds_id
    }

    /// Stack user project.
    #[must_use]
    pub fn stack_user_project_id(&self) -> Option<&str> {
        self.stack_user_project_id.as_deref()
    }

    /// Returns true if failures do not trigger rollback.
    #[must_use]
    pub const fn disable_rollback(&self) -> bool {
        self.disable_rollback
    }

    /// Operation timeout in seconds.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_mins
            .unwrap_or(self.services.config.default_timeout_mins)
            .saturating_mul(60)
    }

    /// Persists the stack, capturing credentials the first time.
    ///
    /// With trust based deferred auth a trust is created through a client
    /// for the caller's context; only the trust is kept, not a password.
    pub async fn store(&mut self) -> Result<StackId, StackflowError> {
        if self.user_creds_id.is_none() {
            let creds = if self.services.config.uses_trusts() {
                let client = self.services.identity.client_for(&self.context)?;
                let trust = client.create_trust_context().await?;
                UserCreds::from_trust(&self.context, trust)
            } else {
                UserCreds::from_context(&self.context)
            };
            self.user_creds_id = Some(self.services.store.user_creds_create(creds).await?);
        }

        self.persist().await?;
        info!(stack = %self.name, stack_id = %self.id, "Stack stored");
        Ok(self.id)
    }

    /// Context rebuilt from the stored credentials.
    ///
    /// Falls back to the current caller's context when no credentials were
    /// stored.
    pub async fn stored_context(&self) -> Result<RequestContext, StackflowError> {
        let Some(creds_id) = self.user_creds_id else {
            return Ok(self.context.clone());
        };
        let creds = self
            .services
            .store
            .user_creds_get(creds_id)
            .await?
            .ok_or_else(|| StoreError::not_found("UserCreds", creds_id.to_string()))?;
        Ok(RequestContext::from_user_creds(&creds))
    }

    /// Records the project created for in-instance users and persists it.
    pub async fn set_stack_user_project_id(
        &mut self,
        project_id: impl Into<String>,
    ) -> Result<(), StackflowError> {
        self.stack_user_project_id = Some(project_id.into());
        self.persist().await
    }

    /// Creates every resource in dependency order.
    ///
    /// On failure with rollback enabled the stack rolls back, which deletes
    /// whatever was created along with the stack record.
    pub async fn create(&mut self) -> Result<(), StackflowError> {
        if self.user_creds_id.is_none() {
            self.store().await?;
        }
        self.state_set(Action::Create, Status::InProgress, "Stack CREATE started")
            .await?;

        let outcome = match Plan::create(&self.template) {
            Ok(plan) => self.execute(Action::Create, vec![plan]).await,
            Err(e) => Err(e),
        };

        match Self::classify(outcome)? {
            RunOutcome::Complete => {
                self.state_set(
                    Action::Create,
                    Status::Complete,
                    "Stack CREATE completed successfully",
                )
                .await
            }
            RunOutcome::Invalid(reason) => {
                self.state_set(Action::Create, Status::Failed, reason).await
            }
            RunOutcome::Failed(reason) => {
                self.state_set(Action::Create, Status::Failed, reason).await?;
                if self.disable_rollback {
                    return Ok(());
                }
                self.delete_with(super::DeleteOptions::rollback()).await
            }
        }
    }

    /// Converges the stack to `template`.
    ///
    /// The previous template is the rollback target if the update fails.
    pub async fn update(&mut self, template: StackTemplate) -> Result<(), StackflowError> {
        self.state_set(Action::Update, Status::InProgress, "Stack UPDATE started")
            .await?;

        let backup = self.template.clone();
        let outcome = match Plan::converge(&backup, &template) {
            Ok(plans) => self.execute(Action::Update, plans).await,
            Err(e) => Err(e),
        };

        match Self::classify(outcome)? {
            RunOutcome::Complete => {
                self.template = template;
                self.state_set(Action::Update, Status::Complete, "Stack successfully updated")
                    .await
            }
            RunOutcome::Invalid(reason) => {
                self.state_set(Action::Update, Status::Failed, reason).await
            }
            RunOutcome::Failed(reason) => {
                self.template = template;
                self.state_set(Action::Update, Status::Failed, reason).await?;
                if self.disable_rollback {
                    return Ok(());
                }
                self.rollback_to(backup).await
            }
        }
    }

    async fn rollback_to(&mut self, backup: StackTemplate) -> Result<(), StackflowError> {
        self.state_set(Action::Rollback, Status::InProgress, "Stack ROLLBACK started")
            .await?;

        let outcome = match Plan::converge(&self.template, &backup) {
            Ok(plans) => self.execute(Action::Rollback, plans).await,
            Err(e) => Err(e),
        };

        match Self::classify(outcome)? {
            RunOutcome::Complete => {
                self.template = backup;
                self.state_set(
                    Action::Rollback,
                    Status::Complete,
                    "Stack ROLLBACK completed successfully",
                )
                .await
            }
            RunOutcome::Failed(reason) | RunOutcome::Invalid(reason) => {
                self.state_set(Action::Rollback, Status::Failed, reason).await
            }
        }
    }

    /// Drives each plan through the scheduler under one shared deadline.
    ///
    /// The deadline is checked before every scheduler step, including the
    /// first, so even a stack with nothing to do honours it.
    pub(crate) async fn execute(
        &self,
        action: Action,
        plans: Vec<Plan>,
    ) -> Result<RunOutcome, StackflowError> {
        let config = Arc::clone(&self.services.config);
        let timeout = Timeout::start(
            Arc::clone(&self.services.clock),
            Duration::from_secs(self.timeout_secs()),
        );

        for plan in plans {
            let group = self.task_group(action, plan)?;
            let mut run = group.start()?;

            let report = loop {
                if timeout.expired() {
                    warn!(
                        stack = %self.name,
                        action = %action,
                        limit_secs = timeout.limit().as_secs(),
                        "Operation timed out"
                    );
                    break run
                        .cancel(action.timed_out_reason(), config.cancel_grace())
                        .await;
                }
                if let GroupPoll::Finished(report) = run.step(config.poll_interval()).await {
                    break report;
                }
            };

            match report.outcome {
                GroupOutcome::Complete => {}
                GroupOutcome::Cancelled(reason) => return Ok(RunOutcome::Failed(reason)),
                GroupOutcome::Failed => {
                    warn!(
                        stack = %self.name,
                        action = %action,
                        failures = %report.failures.to_json(),
                        "Resource actions failed"
                    );
                    let reason = report
                        .failures
                        .status_reason()
                        .unwrap_or_else(|| format!("{} failed", action.title()));
                    return Ok(RunOutcome::Failed(reason));
                }
            }
        }

        Ok(RunOutcome::Complete)
    }

    fn task_group(
        &self,
        action: Action,
        plan: Plan,
    ) -> Result<DependencyTaskGroup, StackflowError> {
        let ctx = ResourceTaskContext {
            stack_id: self.id,
            store: Arc::clone(&self.services.store),
            events: Arc::clone(&self.services.events),
            check_interval: self.services.config.resource_check_interval(),
        };

        let mut tasks: HashMap<String, ResourceTask> = HashMap::with_capacity(plan.ops.len());
        for (name, (definition, op)) in plan.ops {
            let handler = self
                .services
                .handlers
                .resolve(&name, &definition.type_name)?;
            tasks.insert(name, ResourceTask::new(definition, op, handler, ctx.clone()));
        }

        let stack = self.name.clone();
        let group = DependencyTaskGroup::new(
            format!("{}-{}", self.name, action.as_str().to_lowercase()),
            plan.graph,
            plan.direction,
            action,
            Box::new(move |name: &str| -> Box<dyn Task> {
                match tasks.remove(name) {
                    Some(task) => Box::new(task),
                    None => Box::new(Unplanned {
                        name: name.to_string(),
                        action,
                    }),
                }
            }),
        )
        .with_error_handler(Box::new(move |failure| {
            warn!(stack = %stack, resource = %failure.subject, "{}", failure.reason());
        }))
        .with_max_concurrency(self.services.config.max_concurrency);

        Ok(group)
    }

    /// Configuration errors end the operation as [`RunOutcome::Invalid`];
    /// anything else propagates.
    pub(crate) fn classify(
        outcome: Result<RunOutcome, StackflowError>,
    ) -> Result<RunOutcome, StackflowError> {
        match outcome {
            Err(e) if e.is_configuration() => Ok(RunOutcome::Invalid(e.to_string())),
            other => other,
        }
    }

    /// Sets and persists the aggregate state, then emits it.
    pub(crate) async fn state_set(
        &mut self,
        action: Action,
        status: Status,
        reason: impl Into<String>,
    ) -> Result<(), StackflowError> {
        let state = StackState::new(action, status);
        self.state = Some(state);
        self.status_reason = reason.into();
        self.updated_at = Some(Utc::now());

        info!(
            stack = %self.name,
            stack_id = %self.id,
            action = %action,
            status = %status,
            reason = %self.status_reason,
            "Stack state changed"
        );

        self.persist().await?;
        self.services
            .events
            .emit(&StackEvent::stack(self.id, state, self.status_reason.clone()))
            .await;
        Ok(())
    }

    pub(crate) async fn persist(&self) -> Result<(), StackflowError> {
        self.services.store.stack_store(self.to_record()).await?;
        Ok(())
    }

    fn to_record(&self) -> StackRecord {
        StackRecord {
            id: self.id,
            name: self.name.clone(),
            owner_id: self.owner_id,
            action: self.state.map(|s| s.action),
            status: self.state.map(|s| s.status),
            status_reason: self.status_reason.clone(),
            timeout_mins: self.timeout_mins,
            disable_rollback: self.disable_rollback,
            user_creds_id: self.user_creds_id,
            stack_user_project_id: self.stack_user_project_id.clone(),
            template: self.template.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: None,
        }
    }
}

/// Stands in for a graph node with no planned operation.
#[derive(Debug)]
struct Unplanned {
    name: String,
    action: Action,
}

#[async_trait::async_trait]
impl Task for Unplanned {
    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self) -> Action {
        self.action
    }

    async fn resume(&mut self, _token: &CancellationToken) -> TaskStep {
        TaskStep::Failed(HandlerError::new(
            "InternalError",
            format!("no operation planned for {}", self.name),
        ))
    }
}

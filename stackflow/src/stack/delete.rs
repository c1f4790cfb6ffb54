//! Stack deletion and credential cleanup.

use tracing::{debug, info, warn};

use super::engine::RunOutcome;
use super::plan::Plan;
use super::Stack;
use crate::context::RequestContext;
use crate::core::{Action, Status};
use crate::errors::{IdentityError, StackflowError};
use crate::failure::{CleanupKind, FailureCollector, FailureRecord};
use crate::resource::ResourceDefinition;

/// Options for [`Stack::delete_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Requested action name: `DELETE` or `ROLLBACK`. Anything else fails
    /// the delete without touching resources.
    pub action: String,
    /// Deleting a backup snapshot: credentials and the stack user project
    /// are shared with the live stack and are left alone.
    pub backup: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            action: Action::Delete.as_str().to_string(),
            backup: false,
        }
    }
}

impl DeleteOptions {
    /// A plain delete.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A delete performed as rollback.
    #[must_use]
    pub fn rollback() -> Self {
        Self::new().with_action(Action::Rollback.as_str())
    }

    /// Sets the requested action name.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Marks the delete as a backup delete.
    #[must_use]
    pub const fn backup(mut self) -> Self {
        self.backup = true;
        self
    }
}

impl Stack {
    /// Deletes the stack.
    pub async fn delete(&mut self) -> Result<(), StackflowError> {
        self.delete_with(DeleteOptions::new()).await
    }

    /// Deletes every resource in reverse dependency order, then releases
    /// the stack's credentials and project and removes its record.
    ///
    /// Only store failures are returned as errors; every other outcome is
    /// reported through the stack state.
    pub async fn delete_with(&mut self, options: DeleteOptions) -> Result<(), StackflowError> {
        let action = match options.action.parse::<Action>() {
            Ok(action @ (Action::Delete | Action::Rollback)) => action,
            _ => {
                let reason = StackflowError::InvalidAction(options.action.clone()).to_string();
                warn!(stack = %self.name, requested = %options.action, "Rejecting delete");
                return self.state_set(Action::Delete, Status::Failed, reason).await;
            }
        };

        self.state_set(action, Status::InProgress, format!("Stack {action} started"))
            .await?;

        let orphans = self.orphaned_resources().await?;
        let outcome = match Plan::delete(&self.template, orphans) {
            Ok(plan) => self.execute(action, vec![plan]).await,
            Err(e) => Err(e),
        };

        match Self::classify(outcome)? {
            RunOutcome::Complete => {}
            RunOutcome::Failed(reason) | RunOutcome::Invalid(reason) => {
                return self.state_set(action, Status::Failed, reason).await;
            }
        }

        let mut failures = FailureCollector::new();
        if options.backup {
            debug!(stack = %self.name, "Backup delete leaves credentials in place");
        } else if !self.is_root() {
            debug!(stack = %self.name, "Nested stack leaves credentials to its owner");
        } else {
            self.release_credentials(&mut failures).await;
        }

        if let Some(reason) = failures.status_reason() {
            // Resources are gone; the record stays so the leak is visible.
            return self.state_set(action, Status::Failed, reason).await;
        }

        self.state_set(
            action,
            Status::Complete,
            format!("Stack {action} completed successfully"),
        )
        .await?;
        self.services.store.stack_mark_deleted(self.id).await?;
        info!(stack = %self.name, stack_id = %self.id, "Stack deleted");
        Ok(())
    }

    /// Resources with records but no declaration, e.g. left by a failed
    /// update that was not rolled back.
    async fn orphaned_resources(&self) -> Result<Vec<ResourceDefinition>, StackflowError> {
        let records = self.services.store.resources_for_stack(self.id).await?;
        Ok(records
            .into_iter()
            .filter(|record| self.template.get(&record.name).is_none())
            .map(|record| {
                ResourceDefinition::new(record.name, record.type_name)
                    .with_properties(record.properties)
            })
            .collect())
    }

    /// Revokes the trust, tears down the stack user project and, if both
    /// succeeded or were skipped, deletes the stored credentials.
    async fn release_credentials(&mut self, failures: &mut FailureCollector) {
        if let Some(creds_id) = self.user_creds_id {
            let creds = match self.services.store.user_creds_get(creds_id).await {
                Ok(creds) => creds,
                Err(e) => {
                    warn!(
                        stack = %self.name,
                        creds_id = %creds_id,
                        "Could not load credentials: {}",
                        e
                    );
                    None
                }
            };

            if let Some(trust_id) = creds.as_ref().and_then(|c| c.trust_id.clone()) {
                let stored = creds
                    .as_ref()
                    .map(RequestContext::from_user_creds)
                    .unwrap_or_default();
                if let Err(e) = self.delete_trust(&stored, &trust_id).await {
                    failures.record(FailureRecord::cleanup(
                        CleanupKind::Trust,
                        trust_id,
                        e.to_string(),
                    ));
                }
            }
        }

        if let Some(project_id) = self.stack_user_project_id.clone() {
            if let Err(e) = self.delete_project(&project_id).await {
                failures.record(FailureRecord::cleanup(
                    CleanupKind::Project,
                    project_id,
                    e.to_string(),
                ));
            }
        }

        if failures.has_failures() {
            return;
        }

        if let Some(creds_id) = self.user_creds_id.take() {
            match self.services.store.user_creds_delete(creds_id).await {
                Ok(()) => debug!(stack = %self.name, creds_id = %creds_id, "Credentials deleted"),
                Err(e) if e.is_not_found() => {
                    debug!(stack = %self.name, creds_id = %creds_id, "Credentials already gone");
                }
                Err(e) => warn!(
                    stack = %self.name,
                    creds_id = %creds_id,
                    "Could not delete credentials: {}",
                    e
                ),
            }
        }
    }

    /// A trust that no longer exists counts as deleted.
    async fn delete_trust(
        &self,
        stored: &RequestContext,
        trust_id: &str,
    ) -> Result<(), IdentityError> {
        let result = match self.services.identity.client_for(stored) {
            Ok(client) => client.delete_trust(trust_id).await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.is_not_found() => {
                info!(stack = %self.name, trust_id = %trust_id, "Trust already deleted");
                Ok(())
            }
            other => other,
        }
    }

    /// A project that no longer exists counts as deleted.
    async fn delete_project(&self, project_id: &str) -> Result<(), IdentityError> {
        let result = match self.services.identity.client_for(&self.context) {
            Ok(client) => client.delete_stack_domain_project(project_id).await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.is_not_found() => {
                info!(stack = %self.name, project_id = %project_id, "Project already deleted");
                Ok(())
            }
            other => other,
        }
    }
}

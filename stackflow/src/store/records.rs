//! Persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::core::{Action, StackState, Status};
use crate::identity::TrustContext;
use crate::resource::{ResourceDefinition, StackTemplate};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

record_id!(
    /// Stack identifier.
    StackId
);
record_id!(
    /// Stored credentials identifier.
    CredsId
);

/// Persisted stack state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    /// Stack identifier.
    pub id: StackId,
    /// Stack name.
    pub name: String,
    /// Parent stack; `None` for a root stack.
    pub owner_id: Option<StackId>,
    /// Last action.
    pub action: Option<Action>,
    /// Status of the last action.
    pub status: Option<Status>,
    /// Human readable reason for the status.
    #[serde(default)]
    pub status_reason: String,
    /// Operation timeout; the engine default applies when unset.
    pub timeout_mins: Option<u64>,
    /// Skip automatic rollback on failure.
    pub disable_rollback: bool,
    /// Stored credentials.
    pub user_creds_id: Option<CredsId>,
    /// Per-stack user project created for in-instance credentials.
    pub stack_user_project_id: Option<String>,
    /// Current template.
    pub template: StackTemplate,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: Option<DateTime<Utc>>,
    /// Set by a soft delete.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StackRecord {
    /// Current state, if the stack has run any operation.
    #[must_use]
    pub fn state(&self) -> Option<StackState> {
        match (self.action, self.status) {
            (Some(action), Some(status)) => Some(StackState::new(action, status)),
            _ => None,
        }
    }

    /// Returns true if the record was soft deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Persisted state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Owning stack.
    pub stack_id: StackId,
    /// Resource name.
    pub name: String,
    /// Resource type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Properties the resource was last acted on with.
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Last action.
    pub action: Action,
    /// Status of the last action.
    pub status: Status,
    /// Reason for the status.
    #[serde(default)]
    pub status_reason: String,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Builds a record for `definition` in the given state.
    #[must_use]
    pub fn new(
        stack_id: StackId,
        definition: &ResourceDefinition,
        state: StackState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stack_id,
            name: definition.name.clone(),
            type_name: definition.type_name.clone(),
            properties: definition.properties.clone(),
            action: state.action,
            status: state.status,
            status_reason: reason.into(),
            updated_at: Utc::now(),
        }
    }

    /// Resource state.
    #[must_use]
    pub const fn state(&self) -> StackState {
        StackState::new(self.action, self.status)
    }

    /// Returns true if the resource already exists exactly as `definition`
    /// declares it.
    #[must_use]
    pub fn matches(&self, definition: &ResourceDefinition) -> bool {
        self.status == Status::Complete
            && self.action != Action::Delete
            && self.type_name == definition.type_name
            && self.properties == definition.properties
    }

    /// Returns false while the resource's create has not completed.
    #[must_use]
    pub fn is_created(&self) -> bool {
        !(self.action == Action::Create && self.status != Status::Complete)
    }
}

/// Stored credentials used for deferred operations and cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreds {
    /// User name.
    pub username: Option<String>,
    /// Password for password style deferred auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// User the credentials were captured from.
    pub user_id: Option<String>,
    /// Project scope.
    pub project_id: Option<String>,
    /// Trust delegation, for trust style deferred auth.
    pub trust_id: Option<String>,
    /// User who granted the trust.
    pub trustor_user_id: Option<String>,
}

impl UserCreds {
    /// Credentials captured from the caller for password style deferred auth.
    #[must_use]
    pub fn from_context(context: &RequestContext) -> Self {
        Self {
            username: context.username.clone(),
            password: context.password.clone(),
            user_id: context.user_id.clone(),
            project_id: context.project_id.clone(),
            trust_id: None,
            trustor_user_id: None,
        }
    }

    /// Credentials holding only a trust delegation; no password is kept.
    #[must_use]
    pub fn from_trust(context: &RequestContext, trust: TrustContext) -> Self {
        Self {
            username: context.username.clone(),
            password: None,
            user_id: context.user_id.clone(),
            project_id: context.project_id.clone(),
            trust_id: Some(trust.trust_id),
            trustor_user_id: Some(trust.trustor_user_id),
        }
    }
}

//! Failure records and the collector that turns them into a status reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::core::Action;

/// External cleanup step that can fail after resources are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    /// Trust deletion in the identity service.
    Trust,
    /// Stack domain project teardown.
    Project,
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trust => f.write_str("trust"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// Where a failure came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "origin")]
pub enum FailureOrigin {
    /// The resource's own action handler failed.
    Resource,
    /// The resource never started because a predecessor failed.
    Blocked {
        /// The failed resource it was waiting on.
        by: String,
    },
    /// The resource was running when the operation was cancelled.
    Cancelled,
    /// A credential or project cleanup call failed.
    Cleanup {
        /// Which cleanup step.
        kind: CleanupKind,
    },
}

impl FailureOrigin {
    // lower ranks are preferred as the representative failure
    const fn rank(&self) -> u8 {
        match self {
            Self::Resource => 0,
            Self::Cancelled => 1,
            Self::Blocked { .. } => 2,
            Self::Cleanup { .. } => 3,
        }
    }
}

/// Record of a single failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Resource name, or the cleanup target's identifier.
    pub subject: String,
    /// The action that failed.
    pub action: Action,
    /// Where the failure came from.
    #[serde(flatten)]
    pub origin: FailureOrigin,
    /// Error text, e.g. `Exception: foo`.
    pub message: String,
    /// Position of the subject in traversal order.
    pub position: usize,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// A resource handler failure.
    #[must_use]
    pub fn resource(
        subject: impl Into<String>,
        action: Action,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action,
            origin: FailureOrigin::Resource,
            message: message.into(),
            position: usize::MAX,
            timestamp: Utc::now(),
        }
    }

    /// A resource skipped because `by` failed.
    #[must_use]
    pub fn blocked(subject: impl Into<String>, action: Action, by: impl Into<String>) -> Self {
        let by = by.into();
        Self {
            subject: subject.into(),
            action,
            message: format!("dependency {by} failed"),
            origin: FailureOrigin::Blocked { by },
            position: usize::MAX,
            timestamp: Utc::now(),
        }
    }

    /// A resource interrupted by cancellation.
    #[must_use]
    pub fn cancelled(
        subject: impl Into<String>,
        action: Action,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action,
            origin: FailureOrigin::Cancelled,
            message: reason.into(),
            position: usize::MAX,
            timestamp: Utc::now(),
        }
    }

    /// A failed cleanup call.
    #[must_use]
    pub fn cleanup(
        kind: CleanupKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action: Action::Delete,
            origin: FailureOrigin::Cleanup { kind },
            message: message.into(),
            position: usize::MAX,
            timestamp: Utc::now(),
        }
    }

    /// Sets the traversal position.
    #[must_use]
    pub fn at_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Returns true for failures of resource actions (including blocked and cancelled ones).
    #[must_use]
    pub const fn is_resource_level(&self) -> bool {
        !matches!(self.origin, FailureOrigin::Cleanup { .. })
    }

    /// Human readable reason for this failure alone.
    #[must_use]
    pub fn reason(&self) -> String {
        match &self.origin {
            FailureOrigin::Resource | FailureOrigin::Blocked { .. } => {
                format!("Resource {} failed: {}", self.action, self.message)
            }
            FailureOrigin::Cancelled => {
                format!("Resource {} cancelled: {}", self.action, self.message)
            }
            FailureOrigin::Cleanup { kind } => format!("Error deleting {kind}: {}", self.message),
        }
    }
}

/// Collects failures during one stack operation.
#[derive(Debug, Clone, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
    failed_subjects: BTreeSet<String>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn record(&mut self, record: FailureRecord) {
        self.failed_subjects.insert(record.subject.clone());
        self.failures.push(record);
    }

    /// Returns true if any failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns true if any resource-level failure was recorded.
    #[must_use]
    pub fn has_resource_failures(&self) -> bool {
        self.failures.iter().any(FailureRecord::is_resource_level)
    }

    /// Returns true if the subject failed.
    #[must_use]
    pub fn has_failed(&self, subject: &str) -> bool {
        self.failed_subjects.contains(subject)
    }

    /// All failures in the order they were recorded.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failure that stands for the whole operation.
    ///
    /// Direct handler failures win over cancellations, which win over blocked
    /// dependents, which win over cleanup errors; ties go to the earliest
    /// traversal position, then the subject name. Completion order of
    /// concurrent tasks never affects the choice.
    #[must_use]
    pub fn representative(&self) -> Option<&FailureRecord> {
        self.failures.iter().min_by(|a, b| {
            (a.origin.rank(), a.position, &a.subject).cmp(&(
                b.origin.rank(),
                b.position,
                &b.subject,
            ))
        })
    }

    /// Single status reason for the operation, or `None` if nothing failed.
    ///
    /// A resource-level failure is reported on its own. Cleanup failures are
    /// all kept, joined in the order they happened.
    #[must_use]
    pub fn status_reason(&self) -> Option<String> {
        if self.has_resource_failures() {
            return self.representative().map(FailureRecord::reason);
        }

        let cleanup: Vec<String> = self.failures.iter().map(FailureRecord::reason).collect();
        if cleanup.is_empty() {
            None
        } else {
            Some(cleanup.join("; "))
        }
    }

    /// JSON summary for logs.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failed": self.failures.len(),
            "reason": self.status_reason(),
            "failures": self.failures,
        })
    }
}

//! Error types for the stackflow engine.
//!
//! Configuration errors (cycles, unknown actions, unknown resource types) are
//! fatal to an operation. Collaborator errors keep "not found" apart from
//! "forbidden" and "unexpected" so cleanup code can tell a credential that is
//! already gone from one that could not be released.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for stackflow operations.
#[derive(Debug, Error)]
pub enum StackflowError {
    /// The dependency graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] GraphCycleError),

    /// A resource declares a dependency on a resource that does not exist.
    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        /// The declaring resource.
        resource: String,
        /// The missing dependency.
        dependency: String,
    },

    /// No handler is registered for a resource type.
    #[error("Resource '{resource}' has unknown type '{type_name}'")]
    UnknownResourceType {
        /// The resource name.
        resource: String,
        /// The unregistered type.
        type_name: String,
    },

    /// The requested action is not valid for the operation.
    #[error("Invalid action {0}")]
    InvalidAction(String),

    /// The record store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The identity service failed.
    #[error("{0}")]
    Identity(#[from] IdentityError),

    /// The engine configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StackflowError {
    /// Returns true for errors caused by the stack declaration itself.
    ///
    /// These are never retried.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Cycle(_)
                | Self::UnknownDependency { .. }
                | Self::UnknownResourceType { .. }
                | Self::InvalidAction(_)
        )
    }
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Circular dependency found: {}", cycle_path.join(" -> "))]
pub struct GraphCycleError {
    /// The path of resources forming the cycle, first node repeated last.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl GraphCycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Stack contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the references in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }

    /// Returns the distinct resources taking part in the cycle.
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        match self.cycle_path.split_last() {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => &self.cycle_path,
        }
    }
}

/// A terminal failure reported by a resource action handler.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    /// Error class name (e.g. `Exception`, `ResourceInError`).
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error with an explicit kind.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates a handler error of the generic `Exception` kind.
    #[must_use]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new("Exception", message)
    }
}

/// Errors returned by the identity and project services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The object does not exist (already revoked or never issued).
    #[error("NotFound: {0}")]
    NotFound(String),

    /// The caller is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Any other failure.
    #[error("{0}")]
    Unexpected(String),
}

impl IdentityError {
    /// Returns true if the error means there is nothing left to clean up.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors returned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind (`Stack`, `Resource`, `UserCreds`).
        kind: &'static str,
        /// Record identifier.
        id: String,
    },

    /// The record exists but could not be read back.
    #[error("{0}")]
    Corrupted(String),

    /// The backend failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true for a missing record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message() {
        let err = GraphCycleError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert_eq!(err.to_string(), "Circular dependency found: a -> b -> a");
        assert_eq!(err.error_info.code, "GRAPH-CYCLE");
        assert_eq!(err.nodes(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::exception("foo");
        assert_eq!(err.to_string(), "Exception: foo");
    }

    #[test]
    fn test_identity_error_kinds() {
        assert!(IdentityError::NotFound("trust".into()).is_not_found());
        assert!(!IdentityError::Forbidden("Denied!".into()).is_not_found());
        assert_eq!(
            IdentityError::Forbidden("Denied!".into()).to_string(),
            "Forbidden: Denied!"
        );
    }

    #[test]
    fn test_configuration_errors() {
        let cycle: StackflowError = GraphCycleError::new(vec!["a".into(), "a".into()]).into();
        assert!(cycle.is_configuration());
        assert!(StackflowError::InvalidAction("wibble".into()).is_configuration());

        let store: StackflowError = StoreError::not_found("Stack", "s1").into();
        assert!(!store.is_configuration());
        assert_eq!(store.to_string(), "Stack s1 not found");
    }
}

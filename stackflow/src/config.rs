//! Engine configuration.
//!
//! Everything an operation needs to know about deferred authentication and
//! timing is carried in an [`EngineConfig`] handed to the stack services.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::StackflowError;

/// How the engine authenticates when acting on a user's behalf later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredAuthMethod {
    /// Store the user's credentials.
    #[default]
    Password,
    /// Create a trust delegating the user's roles to the engine.
    Trusts,
}

/// Configuration shared by every stack operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deferred authentication method.
    #[serde(default)]
    pub deferred_auth_method: DeferredAuthMethod,
    /// Stack timeout used when the stack does not set one, in minutes.
    #[serde(default = "default_timeout_mins")]
    pub default_timeout_mins: u64,
    /// Longest time a single scheduler step may wait before the deadline is checked again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between completion checks of an in-progress resource action.
    #[serde(default = "default_resource_check_interval_ms")]
    pub resource_check_interval_ms: u64,
    /// Maximum number of resource tasks running at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Time running tasks get to unwind after cancellation.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_timeout_mins() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_resource_check_interval_ms() -> u64 {
    50
}

fn default_cancel_grace_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deferred_auth_method: DeferredAuthMethod::default(),
            default_timeout_mins: default_timeout_mins(),
            poll_interval_ms: default_poll_interval_ms(),
            resource_check_interval_ms: default_resource_check_interval_ms(),
            max_concurrency: None,
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, StackflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the deferred auth method.
    #[must_use]
    pub fn with_deferred_auth_method(mut self, method: DeferredAuthMethod) -> Self {
        self.deferred_auth_method = method;
        self
    }

    /// Sets the default stack timeout in minutes.
    #[must_use]
    pub fn with_default_timeout_mins(mut self, mins: u64) -> Self {
        self.default_timeout_mins = mins;
        self
    }

    /// Sets the scheduler poll interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the resource completion check interval.
    #[must_use]
    pub fn with_resource_check_interval_ms(mut self, ms: u64) -> Self {
        self.resource_check_interval_ms = ms;
        self
    }

    /// Bounds the number of concurrently running tasks.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Sets the cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace_ms(mut self, ms: u64) -> Self {
        self.cancel_grace_ms = ms;
        self
    }

    /// Returns true if deferred auth uses trusts.
    #[must_use]
    pub fn uses_trusts(&self) -> bool {
        self.deferred_auth_method == DeferredAuthMethod::Trusts
    }

    /// Default stack timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_mins * 60)
    }

    /// Scheduler poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resource completion check interval.
    #[must_use]
    pub const fn resource_check_interval(&self) -> Duration {
        Duration::from_millis(self.resource_check_interval_ms)
    }

    /// Cancellation grace period.
    #[must_use]
    pub const fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.deferred_auth_method, DeferredAuthMethod::Password);
        assert_eq!(config.default_timeout(), Duration::from_secs(3600));
        assert_eq!(config.max_concurrency, None);
        assert!(!config.uses_trusts());
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json_str(
            r#"{"deferred_auth_method": "trusts", "max_concurrency": 4}"#,
        )
        .unwrap();

        assert!(config.uses_trusts());
        assert_eq!(config.max_concurrency, Some(4));
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = EngineConfig::from_json_str(r#"{"deferred_auth_method": "kerberos"}"#)
            .unwrap_err();
        assert!(matches!(err, StackflowError::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_deferred_auth_method(DeferredAuthMethod::Trusts)
            .with_poll_interval_ms(5)
            .with_cancel_grace_ms(20);

        assert!(config.uses_trusts());
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.cancel_grace(), Duration::from_millis(20));
    }
}

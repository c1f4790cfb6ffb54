//! Wall-clock deadline for a stack operation.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A deadline started at construction.
///
/// Reads the clock once when started and once per [`Timeout::expired`] check.
#[derive(Debug, Clone)]
pub struct Timeout {
    clock: Arc<dyn Clock>,
    start: Instant,
    limit: Duration,
}

impl Timeout {
    /// Starts a deadline of `limit` from now.
    #[must_use]
    pub fn start(clock: Arc<dyn Clock>, limit: Duration) -> Self {
        let start = clock.now();
        Self { clock, start, limit }
    }

    /// The configured limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Time elapsed since the start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    /// Returns true once the limit has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.elapsed() > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClock;

    #[test]
    fn test_system_clock_not_expired() {
        let timeout = Timeout::start(Arc::new(SystemClock), Duration::from_secs(60));
        assert!(!timeout.expired());
        assert_eq!(timeout.limit(), Duration::from_secs(60));
    }

    #[test]
    fn test_scripted_expiry() {
        let clock = Arc::new(ScriptedClock::new(vec![0, 1, 61]));
        let timeout = Timeout::start(clock.clone(), Duration::from_secs(60));

        assert!(!timeout.expired());
        assert!(timeout.expired());
        assert_eq!(clock.calls(), 3);
    }

    #[test]
    fn test_zero_limit_expires_after_any_progress() {
        let clock = Arc::new(ScriptedClock::new(vec![0, 1]));
        let timeout = Timeout::start(clock, Duration::ZERO);
        assert!(timeout.expired());
    }
}

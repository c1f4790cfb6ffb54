//! Scripted clock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::scheduler::Clock;

/// A clock that returns scripted offsets, in seconds, from a fixed base.
///
/// Once the script runs out the last offset repeats.
#[derive(Debug)]
pub struct ScriptedClock {
    base: Instant,
    script: Mutex<Vec<u64>>,
    calls: AtomicUsize,
}

impl ScriptedClock {
    /// Creates a clock following `script`.
    #[must_use]
    pub fn new(script: Vec<u64>) -> Self {
        Self {
            base: Instant::now(),
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// A clock that never advances.
    #[must_use]
    pub fn frozen() -> Self {
        Self::new(vec![0])
    }

    /// Replaces the script and resets the call counter.
    pub fn set_script(&self, script: Vec<u64>) {
        *self.script.lock() = script;
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Number of times the clock was read since the last reset.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> Instant {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock();
        let offset = script
            .get(index)
            .or_else(|| script.last())
            .copied()
            .unwrap_or(0);
        self.base + Duration::from_secs(offset)
    }
}

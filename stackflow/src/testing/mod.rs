//! Testing utilities for stacks.
//!
//! This module provides:
//! - Resource handlers with scripted behaviour
//! - A fake identity service recording every client it hands out
//! - A scripted clock for deterministic timeouts
//! - A store wrapper that injects faults

mod clock;
mod fixtures;
mod identity;
mod mocks;

pub use clock::ScriptedClock;
pub use fixtures::{assert_state, FaultyStore};
pub use identity::FakeIdentityService;
pub use mocks::{FailingHandler, GenericResourceHandler, PollingHandler, StuckHandler};

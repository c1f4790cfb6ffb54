//! Failure aggregation.
//!
//! Per-resource failures and credential/project cleanup errors are collected
//! into one [`FailureCollector`] which renders the single status reason a
//! stack reports.

mod collector;

pub use collector::{CleanupKind, FailureCollector, FailureOrigin, FailureRecord};

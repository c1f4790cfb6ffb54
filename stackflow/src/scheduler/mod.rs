//! Dependency-ordered task scheduling.
//!
//! This module provides:
//! - The [`Task`] contract: a resumable unit of work with suspension points
//! - [`DependencyTaskGroup`]: runs one task per graph node in dependency order
//! - [`Timeout`] and [`Clock`]: the wall-clock deadline a caller checks
//!   between scheduler steps

mod group;
mod task;
mod timeout;

pub use group::{
    DependencyTaskGroup, ErrorHandler, GroupOutcome, GroupPoll, GroupReport, TaskFactory,
    TaskGroupRun,
};
pub use task::{Task, TaskStep};
pub use timeout::{Clock, SystemClock, Timeout};

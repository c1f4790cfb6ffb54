//! The resumable task contract.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::cancellation::CancellationToken;
use crate::core::Action;
use crate::errors::HandlerError;

/// Result of resuming a task by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStep {
    /// The task suspended and wants to be resumed again.
    Running,
    /// The task finished successfully.
    Complete,
    /// The task failed terminally.
    Failed(HandlerError),
    /// The task observed cancellation and unwound.
    Cancelled,
}

impl TaskStep {
    /// Returns true if the task will not be resumed again.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A unit of work driven step by step by the scheduler.
///
/// Each call to [`Task::resume`] runs until the next suspension point.
/// Implementations must check `token` at every wait and return
/// [`TaskStep::Cancelled`] promptly once it fires; a cancelled task must not
/// report success for work it did not finish.
#[async_trait]
pub trait Task: Send + Debug {
    /// Name of the graph node this task belongs to.
    fn name(&self) -> &str;

    /// The action the task performs, used in failure reasons.
    fn action(&self) -> Action;

    /// Runs the task to its next suspension point.
    async fn resume(&mut self, token: &CancellationToken) -> TaskStep;
}

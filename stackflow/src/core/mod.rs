//! Core lifecycle types shared by stacks and resources.

mod status;

pub use status::{Action, StackState, Status};

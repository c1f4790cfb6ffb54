//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared by a scheduler run and every task it
//! drives. Tasks observe it at their suspension points and unwind.

mod token;

pub use token::CancellationToken;

//! Stacks and their lifecycle operations.
//!
//! A [`Stack`] drives its resources through create, update, delete and
//! rollback by handing per-resource tasks to the dependency scheduler,
//! checking its deadline between scheduler steps. Root stacks also own the
//! credentials and project captured at creation and release them on delete.

mod delete;
mod engine;
mod plan;
mod services;


pub use delete::DeleteOptions;
pub use engine::Stack;
pub use services::StackServices;

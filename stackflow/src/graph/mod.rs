//! Resource dependency graph.
//!
//! Nodes are resource names; an edge `a -> b` means `a` requires `b`, so `b`
//! must be created before `a` and deleted after it.

mod dependencies;

pub use dependencies::{Dependencies, Direction};

//! Converge Target
//!
//! Reference [`Target`](converge_task::Target) implementations: an in-memory
//! state store and a dry run that records what would have been written.

mod dry_run;
mod memory;

pub use dry_run::{DryRunTarget, PlannedChange};
pub use memory::MemoryTarget;

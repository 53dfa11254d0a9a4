//! Converge Engine
//!
//! Executes a validated dependency graph level by level against a
//! [`Target`](converge_task::Target), enforcing dependency order while running
//! independent tasks concurrently.

mod config;
mod events;
mod executor;
mod report;

pub use config::ExecutorConfig;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::Executor;
pub use report::{RunReport, RunSummary, SkipReason, TaskOutcome};

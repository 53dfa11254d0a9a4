//! Converge Graph
//!
//! Turns a [`TaskSet`](converge_task::TaskSet) into a validated dependency
//! graph and an execution plan of concurrent levels.
//!
//! Dependencies are either declared by a task or inferred from its fields.
//! The graph is rejected if a dependency is outside the task set, a field
//! cannot be classified, or the dependencies form a cycle.

mod error;
mod graph;
mod plan;
mod resolver;

pub use error::GraphError;
pub use graph::DependencyGraph;
pub use plan::ExecutionPlan;
pub use resolver::{find_dependencies, find_task_dependencies};

use thiserror::Error;

/// Errors that stop a run before any task is rendered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
  /// A task references a task instance that is not part of the task set.
  #[error("task '{task}' depends on a {type_name} task at {path} that is not in the task set")]
  DependencyNotFound {
    task: String,
    path: String,
    type_name: String,
  },

  /// An edge names a key that is not part of the graph.
  #[error("task '{task}' depends on unknown task '{dependency}'")]
  UnknownTask { task: String, dependency: String },

  /// A value reachable from a task could not be classified.
  #[error("task '{task}' has a field of unhandled type {type_name} at {path}")]
  Unclassifiable {
    task: String,
    path: String,
    type_name: String,
  },

  /// The graph contains a cycle; `cycle` lists its keys in dependency order.
  #[error("dependency cycle detected: {}", format_cycle(.cycle))]
  CycleDetected { cycle: Vec<String> },
}

fn format_cycle(cycle: &[String]) -> String {
  match cycle.first() {
    Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
    None => String::new(),
  }
}

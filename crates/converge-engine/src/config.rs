use std::time::Duration;

/// Configuration for the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
  /// Upper bound on tasks rendering at once across a level. `None` runs every
  /// task of a level concurrently.
  pub max_concurrency: Option<usize>,
  /// Deadline for a single task's render. `None` waits indefinitely.
  pub task_timeout: Option<Duration>,
}

impl ExecutorConfig {
  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = Some(max_concurrency);
    self
  }

  pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
    self.task_timeout = Some(timeout);
    self
  }
}

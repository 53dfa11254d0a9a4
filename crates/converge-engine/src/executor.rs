//! Level-by-level task execution.
//!
//! The `Executor` runs the levels of a dependency graph in ascending order.
//! Every task of a level is dispatched concurrently and the next level starts
//! only once the whole level has reached a terminal state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use converge_graph::{DependencyGraph, GraphError};
use converge_task::{RenderContext, RenderOutcome, Target, Task, TaskError, TaskSet};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::report::{RunReport, SkipReason, TaskOutcome};

/// The task executor.
///
/// Generic over `N: ExecutionNotifier` to allow different notification strategies.
/// Use `Executor::new()` to discard events, or `Executor::with_notifier()` to
/// observe them.
pub struct Executor<N: ExecutionNotifier = NoopNotifier> {
  config: ExecutorConfig,
  notifier: N,
}

impl Executor<NoopNotifier> {
  pub fn new(config: ExecutorConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Executor<N> {
  pub fn with_notifier(config: ExecutorConfig, notifier: N) -> Self {
    Self { config, notifier }
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  /// Build the dependency graph for `tasks` and execute it.
  pub async fn build_and_execute(
    &self,
    tasks: Arc<TaskSet>,
    target: Arc<dyn Target>,
    cancel: CancellationToken,
  ) -> Result<RunReport, GraphError> {
    let graph = DependencyGraph::build(&tasks)?;
    Ok(self.execute(tasks, &graph, target, cancel).await)
  }

  /// Execute every task of `graph` against `target`.
  ///
  /// Always returns a complete report: one outcome per task. A failed task
  /// causes its transitive dependents to be skipped, but does not stop
  /// independent branches.
  #[instrument(
    name = "run_execute",
    skip_all,
    fields(target = target.name(), tasks = graph.len())
  )]
  pub async fn execute(
    &self,
    tasks: Arc<TaskSet>,
    graph: &DependencyGraph,
    target: Arc<dyn Target>,
    cancel: CancellationToken,
  ) -> RunReport {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let plan = graph.plan();
    let permits = self
      .config
      .max_concurrency
      .map(|n| Arc::new(Semaphore::new(n.max(1))));

    info!(
      run_id = %run_id,
      tasks = plan.len(),
      levels = plan.depth(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      tasks: plan.len(),
      levels: plan.depth(),
    });

    let mut results: BTreeMap<String, TaskOutcome> = BTreeMap::new();
    // Tasks that failed only because the run was cancelled under them.
    let mut interrupted: BTreeSet<String> = BTreeSet::new();

    for (index, level) in plan.levels().iter().enumerate() {
      if cancel.is_cancelled() {
        warn!(run_id = %run_id, level = index, "run cancelled, not dispatching remaining levels");
        for key in plan.levels()[index..].iter().flatten() {
          let reason =
            skip_reason(graph, key, &results, &interrupted).unwrap_or(SkipReason::Cancelled);
          self.record_skip(&run_id, &mut results, key, reason);
        }
        break;
      }

      info!(run_id = %run_id, level = index, tasks = ?level, "executing level");
      self.notifier.notify(ExecutionEvent::LevelStarted {
        run_id: run_id.clone(),
        level: index,
        tasks: level.clone(),
      });

      let mut dispatched = Vec::with_capacity(level.len());
      let mut handles = Vec::with_capacity(level.len());

      for key in level {
        if let Some(reason) = skip_reason(graph, key, &results, &interrupted) {
          self.record_skip(&run_id, &mut results, key, reason);
          continue;
        }

        let Some(task) = tasks.get(key).cloned() else {
          self.record_failure(&run_id, &mut results, key, "task is not in the task set".to_string());
          continue;
        };

        self.notifier.notify(ExecutionEvent::TaskStarted {
          run_id: run_id.clone(),
          key: key.clone(),
        });

        dispatched.push(key.clone());
        handles.push(tokio::spawn(render_task(
          key.clone(),
          task,
          target.clone(),
          cancel.clone(),
          self.config.task_timeout,
          permits.clone(),
        )));
      }

      // Wait for the whole level
      let joined = futures::future::join_all(handles).await;

      for (key, joined) in dispatched.into_iter().zip(joined) {
        match joined {
          Ok(Ok(outcome)) => {
            info!(run_id = %run_id, key = %key, outcome = ?outcome, "task_succeeded");
            self.notifier.notify(ExecutionEvent::TaskSucceeded {
              run_id: run_id.clone(),
              key: key.clone(),
              outcome: outcome.clone(),
            });
            results.insert(key, TaskOutcome::Succeeded { outcome });
          }
          Ok(Err(e)) => {
            if matches!(e, TaskError::Cancelled) {
              interrupted.insert(key.clone());
            }
            self.record_failure(&run_id, &mut results, &key, e.to_string())
          }
          Err(e) => {
            self.record_failure(&run_id, &mut results, &key, format!("task join error: {}", e))
          }
        }
      }
    }

    let report = RunReport {
      run_id: run_id.clone(),
      started_at,
      finished_at: Utc::now(),
      levels: plan.levels().to_vec(),
      results,
    };

    let summary = report.summary();
    if report.is_success() {
      info!(run_id = %run_id, summary = %summary, "run_completed");
    } else {
      error!(run_id = %run_id, summary = %summary, failed = ?report.failed(), "run_failed");
    }
    self.notifier.notify(ExecutionEvent::RunCompleted {
      run_id,
      succeeded: summary.succeeded,
      failed: summary.failed,
      skipped: summary.skipped,
    });

    report
  }

  fn record_failure(
    &self,
    run_id: &str,
    results: &mut BTreeMap<String, TaskOutcome>,
    key: &str,
    error: String,
  ) {
    error!(run_id = %run_id, key = %key, error = %error, "task_failed");
    self.notifier.notify(ExecutionEvent::TaskFailed {
      run_id: run_id.to_string(),
      key: key.to_string(),
      error: error.clone(),
    });
    results.insert(key.to_string(), TaskOutcome::Failed { error });
  }

  fn record_skip(
    &self,
    run_id: &str,
    results: &mut BTreeMap<String, TaskOutcome>,
    key: &str,
    reason: SkipReason,
  ) {
    warn!(run_id = %run_id, key = %key, reason = %reason, "task_skipped");
    self.notifier.notify(ExecutionEvent::TaskSkipped {
      run_id: run_id.to_string(),
      key: key.to_string(),
      reason: reason.clone(),
    });
    results.insert(key.to_string(), TaskOutcome::Skipped { reason });
  }
}

/// Decide whether `key` must be skipped because of its dependencies.
///
/// A failed direct dependency is reported as the ancestor; otherwise the
/// reason recorded on a skipped dependency is carried forward, a failed
/// ancestor winning over cancellation. A dependency in `interrupted` counts
/// as cancelled, not failed.
fn skip_reason(
  graph: &DependencyGraph,
  key: &str,
  results: &BTreeMap<String, TaskOutcome>,
  interrupted: &BTreeSet<String>,
) -> Option<SkipReason> {
  let mut inherited = None;
  for dependency in graph.dependencies(key) {
    match results.get(dependency) {
      Some(TaskOutcome::Failed { .. }) if interrupted.contains(dependency) => {
        if inherited.is_none() {
          inherited = Some(SkipReason::Cancelled);
        }
      }
      Some(TaskOutcome::Failed { .. }) => {
        return Some(SkipReason::UpstreamFailed {
          ancestor: dependency.to_string(),
        });
      }
      Some(TaskOutcome::Skipped { reason }) => {
        if matches!(inherited, None | Some(SkipReason::Cancelled)) {
          inherited = Some(reason.clone());
        }
      }
      _ => {}
    }
  }
  inherited
}

#[instrument(name = "task_render", skip(task, target, cancel, timeout, permits), fields(type_name = task.type_name()))]
async fn render_task(
  key: String,
  task: Arc<dyn Task>,
  target: Arc<dyn Target>,
  cancel: CancellationToken,
  timeout: Option<Duration>,
  permits: Option<Arc<Semaphore>>,
) -> Result<RenderOutcome, TaskError> {
  let _permit = match permits {
    Some(permits) => tokio::select! {
      permit = permits.acquire_owned() => Some(permit.map_err(|e| TaskError::target(e.to_string()))?),
      _ = cancel.cancelled() => return Err(TaskError::Cancelled),
    },
    None => None,
  };

  // Lifecycle is read once, at dispatch.
  let ctx = RenderContext {
    key: &key,
    type_name: task.type_name(),
    lifecycle: task.lifecycle(),
    target: target.as_ref(),
    cancel: &cancel,
  };

  let render = async {
    match timeout {
      Some(timeout) => match tokio::time::timeout(timeout, task.render(&ctx)).await {
        Ok(result) => result,
        Err(_) => Err(TaskError::Timeout {
          timeout_ms: timeout.as_millis() as u64,
        }),
      },
      None => task.render(&ctx).await,
    }
  };

  tokio::select! {
    result = render => result,
    _ = cancel.cancelled() => Err(TaskError::Cancelled),
  }
}

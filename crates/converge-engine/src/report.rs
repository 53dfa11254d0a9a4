use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use converge_task::RenderOutcome;
use serde::{Deserialize, Serialize};

/// Why a task was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
  /// `ancestor` is the failed task this one transitively depends on.
  UpstreamFailed { ancestor: String },
  /// The run was cancelled before the task's level was dispatched.
  Cancelled,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::UpstreamFailed { ancestor } => write!(f, "upstream task '{ancestor}' failed"),
      SkipReason::Cancelled => f.write_str("run cancelled"),
    }
  }
}

/// Terminal state of one task in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
  Succeeded { outcome: RenderOutcome },
  Failed { error: String },
  Skipped { reason: SkipReason },
}

impl TaskOutcome {
  pub fn is_succeeded(&self) -> bool {
    matches!(self, Self::Succeeded { .. })
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, Self::Failed { .. })
  }

  pub fn is_skipped(&self) -> bool {
    matches!(self, Self::Skipped { .. })
  }
}

/// Result of a complete run: one outcome per task in the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id: String,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  /// The levels the run was planned with.
  pub levels: Vec<Vec<String>>,
  pub results: BTreeMap<String, TaskOutcome>,
}

impl RunReport {
  /// A run succeeds when nothing failed and nothing was cut short by
  /// cancellation.
  pub fn is_success(&self) -> bool {
    self.results.values().all(|outcome| match outcome {
      TaskOutcome::Succeeded { .. } => true,
      TaskOutcome::Failed { .. } => false,
      TaskOutcome::Skipped { reason } => *reason != SkipReason::Cancelled,
    })
  }

  pub fn get(&self, key: &str) -> Option<&TaskOutcome> {
    self.results.get(key)
  }

  pub fn succeeded(&self) -> Vec<&str> {
    self.keys_where(TaskOutcome::is_succeeded)
  }

  pub fn failed(&self) -> Vec<&str> {
    self.keys_where(TaskOutcome::is_failed)
  }

  pub fn skipped(&self) -> Vec<&str> {
    self.keys_where(TaskOutcome::is_skipped)
  }

  pub fn duration(&self) -> chrono::Duration {
    self.finished_at - self.started_at
  }

  pub fn summary(&self) -> RunSummary {
    let mut summary = RunSummary {
      total: self.results.len(),
      ..Default::default()
    };
    for outcome in self.results.values() {
      match outcome {
        TaskOutcome::Succeeded { outcome } => {
          summary.succeeded += 1;
          if outcome.is_change() {
            summary.changed += 1;
          }
        }
        TaskOutcome::Failed { .. } => summary.failed += 1,
        TaskOutcome::Skipped { .. } => summary.skipped += 1,
      }
    }
    summary
  }

  fn keys_where(&self, predicate: fn(&TaskOutcome) -> bool) -> Vec<&str> {
    self
      .results
      .iter()
      .filter(|(_, outcome)| predicate(outcome))
      .map(|(key, _)| key.as_str())
      .collect()
  }
}

/// Counts of task outcomes in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub total: usize,
  pub succeeded: usize,
  /// Succeeded tasks that created or updated an object.
  pub changed: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} tasks: {} succeeded ({} changed), {} failed, {} skipped",
      self.total, self.succeeded, self.changed, self.failed, self.skipped
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn report(results: Vec<(&str, TaskOutcome)>) -> RunReport {
    let now = Utc::now();
    RunReport {
      run_id: "run".to_string(),
      started_at: now,
      finished_at: now,
      levels: Vec::new(),
      results: results
        .into_iter()
        .map(|(k, o)| (k.to_string(), o))
        .collect(),
    }
  }

  #[test]
  fn test_summary_counts() {
    let report = report(vec![
      (
        "a",
        TaskOutcome::Succeeded {
          outcome: RenderOutcome::Created,
        },
      ),
      (
        "b",
        TaskOutcome::Succeeded {
          outcome: RenderOutcome::Unchanged,
        },
      ),
      (
        "c",
        TaskOutcome::Failed {
          error: "boom".to_string(),
        },
      ),
      (
        "d",
        TaskOutcome::Skipped {
          reason: SkipReason::UpstreamFailed {
            ancestor: "c".to_string(),
          },
        },
      ),
    ]);

    let summary = report.summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.changed, 1);
    assert_eq!(
      summary.to_string(),
      "4 tasks: 2 succeeded (1 changed), 1 failed, 1 skipped"
    );
    assert!(!report.is_success());
    assert_eq!(report.failed(), vec!["c"]);
    assert_eq!(report.skipped(), vec!["d"]);
  }

  #[test]
  fn test_cancelled_run_is_not_a_success() {
    let report = report(vec![(
      "a",
      TaskOutcome::Skipped {
        reason: SkipReason::Cancelled,
      },
    )]);
    assert!(!report.is_success());
  }

  #[test]
  fn test_outcome_serialization() {
    let outcome = TaskOutcome::Skipped {
      reason: SkipReason::UpstreamFailed {
        ancestor: "net".to_string(),
      },
    };
    assert_eq!(
      serde_json::to_value(&outcome).unwrap(),
      serde_json::json!({
        "status": "skipped",
        "reason": { "reason": "upstream_failed", "ancestor": "net" }
      })
    );
  }

  #[test]
  fn test_report_keys_are_snake_case() {
    let value = serde_json::to_value(report(Vec::new())).unwrap();
    let keys: Vec<&str> = value
      .as_object()
      .unwrap()
      .keys()
      .map(|k| k.as_str())
      .collect();
    assert_eq!(
      keys,
      vec!["finished_at", "levels", "results", "run_id", "started_at"]
    );
  }
}

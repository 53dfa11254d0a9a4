use std::collections::BTreeMap;

use async_trait::async_trait;
use converge_task::{
  Change, PlannedAction, Reconciliation, RenderOutcome, Target, TaskError, reconcile,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

/// A write a dry run would have performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
  pub key: String,
  pub type_name: String,
  pub action: PlannedAction,
  pub desired: Value,
}

/// Evaluates lifecycle policy against a fixed state without writing anything.
#[derive(Debug, Default)]
pub struct DryRunTarget {
  state: BTreeMap<String, Value>,
  planned: Mutex<Vec<PlannedChange>>,
}

impl DryRunTarget {
  pub fn new(state: BTreeMap<String, Value>) -> Self {
    Self {
      state,
      planned: Mutex::new(Vec::new()),
    }
  }

  /// Planned changes, ordered by key.
  pub async fn changes(&self) -> Vec<PlannedChange> {
    let mut changes = self.planned.lock().await.clone();
    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
  }
}

#[async_trait]
impl Target for DryRunTarget {
  fn name(&self) -> &str {
    "dry-run"
  }

  async fn apply(&self, change: Change) -> Result<RenderOutcome, TaskError> {
    let action = match reconcile(&change, self.state.get(&change.key))? {
      Reconciliation::Skip => return Ok(RenderOutcome::Ignored),
      Reconciliation::Unchanged => return Ok(RenderOutcome::Unchanged),
      Reconciliation::Warn { message } => return Ok(RenderOutcome::Warned { message }),
      Reconciliation::Create => PlannedAction::Create,
      Reconciliation::Update => PlannedAction::Update,
    };

    info!(key = %change.key, action = ?action, "planned change");
    self.planned.lock().await.push(PlannedChange {
      key: change.key,
      type_name: change.type_name,
      action,
      desired: change.desired,
    });
    Ok(RenderOutcome::Planned { action })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use converge_task::Lifecycle;
  use serde_json::json;

  fn change(key: &str, lifecycle: Lifecycle, desired: Value) -> Change {
    Change {
      key: key.to_string(),
      type_name: "subnet".to_string(),
      lifecycle,
      desired,
    }
  }

  #[tokio::test]
  async fn test_records_creates_and_updates_sorted() {
    let mut state = BTreeMap::new();
    state.insert("b".to_string(), json!({ "cidr": "10.0.1.0/24" }));
    state.insert("c".to_string(), json!({ "cidr": "10.0.2.0/24" }));
    let target = DryRunTarget::new(state);

    let updated = target
      .apply(change("b", Lifecycle::Normal, json!({ "cidr": "10.0.9.0/24" })))
      .await
      .unwrap();
    let created = target
      .apply(change("a", Lifecycle::Normal, json!({ "cidr": "10.0.3.0/24" })))
      .await
      .unwrap();
    let unchanged = target
      .apply(change("c", Lifecycle::Normal, json!({ "cidr": "10.0.2.0/24" })))
      .await
      .unwrap();

    assert_eq!(
      updated,
      RenderOutcome::Planned {
        action: PlannedAction::Update
      }
    );
    assert_eq!(
      created,
      RenderOutcome::Planned {
        action: PlannedAction::Create
      }
    );
    assert_eq!(unchanged, RenderOutcome::Unchanged);

    let keys: Vec<String> = target.changes().await.into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["a", "b"]);
  }

  #[tokio::test]
  async fn test_policy_errors_surface_in_dry_run() {
    let target = DryRunTarget::default();
    let err = target
      .apply(change("a", Lifecycle::ExistsAndWarnIfChanges, json!({})))
      .await
      .unwrap_err();
    assert!(matches!(err, TaskError::NotFound { .. }));
    assert!(target.changes().await.is_empty());
  }
}

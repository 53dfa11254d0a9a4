use std::collections::BTreeMap;

use async_trait::async_trait;
use converge_task::{Change, Reconciliation, RenderOutcome, Target, TaskError, reconcile};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A target that keeps the desired state of every object in memory.
///
/// Objects are keyed by task key. A read-only target evaluates lifecycle
/// policy as usual but refuses every write with an access denied error.
#[derive(Debug, Default)]
pub struct MemoryTarget {
  state: RwLock<BTreeMap<String, Value>>,
  read_only: bool,
}

impl MemoryTarget {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed the target with previously saved state.
  pub fn from_snapshot(snapshot: BTreeMap<String, Value>) -> Self {
    Self {
      state: RwLock::new(snapshot),
      read_only: false,
    }
  }

  /// Refuse every create and update.
  pub fn read_only(mut self) -> Self {
    self.read_only = true;
    self
  }

  pub fn is_read_only(&self) -> bool {
    self.read_only
  }

  pub async fn get(&self, key: &str) -> Option<Value> {
    self.state.read().await.get(key).cloned()
  }

  /// Copy of the current state.
  pub async fn snapshot(&self) -> BTreeMap<String, Value> {
    self.state.read().await.clone()
  }

  async fn converge(&self, change: Change) -> Result<RenderOutcome, TaskError> {
    // Held across check and write so concurrent changes to one key serialize.
    let mut state = self.state.write().await;

    let reconciliation = reconcile(&change, state.get(&change.key))?;
    debug!(key = %change.key, reconciliation = ?reconciliation, "reconciled");

    let outcome = match reconciliation {
      Reconciliation::Skip => return Ok(RenderOutcome::Ignored),
      Reconciliation::Unchanged => return Ok(RenderOutcome::Unchanged),
      Reconciliation::Warn { message } => return Ok(RenderOutcome::Warned { message }),
      Reconciliation::Create => RenderOutcome::Created,
      Reconciliation::Update => RenderOutcome::Updated,
    };

    if self.read_only {
      return Err(TaskError::access_denied(
        &change.key,
        format!("target is read-only, cannot write {}", change.type_name),
      ));
    }

    info!(key = %change.key, type_name = %change.type_name, outcome = ?outcome, "writing object");
    state.insert(change.key, change.desired);
    Ok(outcome)
  }
}

#[async_trait]
impl Target for MemoryTarget {
  fn name(&self) -> &str {
    "memory"
  }

  async fn apply(&self, change: Change) -> Result<RenderOutcome, TaskError> {
    let lifecycle = change.lifecycle;
    lifecycle.tolerate(self.converge(change).await)
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
      type_name: "network".to_string(),
      lifecycle,
      desired,
    }
  }

  #[tokio::test]
  async fn test_create_update_unchanged() {
    let target = MemoryTarget::new();
    let first = change("net", Lifecycle::Normal, json!({ "cidr": "10.0.0.0/16" }));
    assert_eq!(target.apply(first.clone()).await.unwrap(), RenderOutcome::Created);
    assert_eq!(target.apply(first).await.unwrap(), RenderOutcome::Unchanged);

    let second = change("net", Lifecycle::Normal, json!({ "cidr": "10.1.0.0/16" }));
    assert_eq!(target.apply(second).await.unwrap(), RenderOutcome::Updated);
    assert_eq!(
      target.get("net").await,
      Some(json!({ "cidr": "10.1.0.0/16" }))
    );
  }

  #[tokio::test]
  async fn test_exists_and_warn_if_changes_leaves_state() {
    let mut snapshot = BTreeMap::new();
    snapshot.insert("net".to_string(), json!({ "cidr": "10.0.0.0/16" }));
    let target = MemoryTarget::from_snapshot(snapshot);

    let outcome = target
      .apply(change(
        "net",
        Lifecycle::ExistsAndWarnIfChanges,
        json!({ "cidr": "10.9.0.0/16" }),
      ))
      .await
      .unwrap();

    assert!(matches!(outcome, RenderOutcome::Warned { .. }));
    assert_eq!(
      target.get("net").await,
      Some(json!({ "cidr": "10.0.0.0/16" }))
    );
  }

  #[tokio::test]
  async fn test_exists_and_validates_requires_object() {
    let target = MemoryTarget::new();
    let err = target
      .apply(change("net", Lifecycle::ExistsAndValidates, json!({})))
      .await
      .unwrap_err();
    assert!(matches!(err, TaskError::NotFound { .. }));
    assert!(target.snapshot().await.is_empty());
  }

  #[tokio::test]
  async fn test_ignore_never_touches_state() {
    let target = MemoryTarget::new().read_only();
    let outcome = target
      .apply(change("net", Lifecycle::Ignore, json!({ "cidr": "x" })))
      .await
      .unwrap();
    assert_eq!(outcome, RenderOutcome::Ignored);
  }

  #[tokio::test]
  async fn test_read_only_denies_writes() {
    let target = MemoryTarget::new().read_only();
    let err = target
      .apply(change("net", Lifecycle::Normal, json!({ "cidr": "x" })))
      .await
      .unwrap_err();
    assert!(err.is_access_denied());
  }

  #[tokio::test]
  async fn test_read_only_tolerated_under_warn_if_insufficient_access() {
    let target = MemoryTarget::new().read_only();
    let outcome = target
      .apply(change(
        "net",
        Lifecycle::WarnIfInsufficientAccess,
        json!({ "cidr": "x" }),
      ))
      .await
      .unwrap();
    match outcome {
      RenderOutcome::Warned { message } => assert!(message.starts_with("insufficient access")),
      other => panic!("expected warning, got {:?}", other),
    }
    assert!(target.get("net").await.is_none());
  }
}

//! Lifecycle policy and the drift evaluation shared by targets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ParseLifecycleError, TaskError};
use crate::target::{Change, RenderOutcome};

/// Controls how a task treats drift between desired and actual state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lifecycle {
  /// Apply the change.
  #[default]
  #[serde(alias = "Sync")]
  Normal,
  /// The object must exist; differences are reported but not applied.
  ExistsAndWarnIfChanges,
  /// The object must exist and already match the desired state.
  ExistsAndValidates,
  /// Authorization failures become warnings instead of errors.
  WarnIfInsufficientAccess,
  /// Do not render at all.
  Ignore,
}

impl Lifecycle {
  pub const ALL: [Lifecycle; 5] = [
    Lifecycle::Normal,
    Lifecycle::ExistsAndWarnIfChanges,
    Lifecycle::ExistsAndValidates,
    Lifecycle::WarnIfInsufficientAccess,
    Lifecycle::Ignore,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Lifecycle::Normal => "Normal",
      Lifecycle::ExistsAndWarnIfChanges => "ExistsAndWarnIfChanges",
      Lifecycle::ExistsAndValidates => "ExistsAndValidates",
      Lifecycle::WarnIfInsufficientAccess => "WarnIfInsufficientAccess",
      Lifecycle::Ignore => "Ignore",
    }
  }

  /// Whether the object must already exist for rendering to succeed.
  pub fn requires_existing(&self) -> bool {
    matches!(
      self,
      Lifecycle::ExistsAndWarnIfChanges | Lifecycle::ExistsAndValidates
    )
  }

  /// Downgrade an authorization failure to a warning under
  /// [`Lifecycle::WarnIfInsufficientAccess`]. Every other result passes
  /// through untouched.
  pub fn tolerate(
    &self,
    result: Result<RenderOutcome, TaskError>,
  ) -> Result<RenderOutcome, TaskError> {
    match result {
      Err(TaskError::AccessDenied { key, message })
        if *self == Lifecycle::WarnIfInsufficientAccess =>
      {
        warn!(key = %key, error = %message, "insufficient access, continuing");
        Ok(RenderOutcome::Warned {
          message: format!("insufficient access: {message}"),
        })
      }
      other => other,
    }
  }

  fn to_u8(self) -> u8 {
    match self {
      Lifecycle::Normal => 0,
      Lifecycle::ExistsAndWarnIfChanges => 1,
      Lifecycle::ExistsAndValidates => 2,
      Lifecycle::WarnIfInsufficientAccess => 3,
      Lifecycle::Ignore => 4,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      1 => Lifecycle::ExistsAndWarnIfChanges,
      2 => Lifecycle::ExistsAndValidates,
      3 => Lifecycle::WarnIfInsufficientAccess,
      4 => Lifecycle::Ignore,
      _ => Lifecycle::Normal,
    }
  }
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Lifecycle {
  type Err = ParseLifecycleError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s == "Sync" {
      return Ok(Lifecycle::Normal);
    }
    Lifecycle::ALL
      .into_iter()
      .find(|l| l.as_str() == s)
      .ok_or_else(|| ParseLifecycleError(s.to_string()))
  }
}

/// Lifecycle storage for task types.
///
/// Tasks are shared behind `Arc` once they reference each other, so the
/// lifecycle is kept in an atomic that can be updated through `&self`.
#[derive(Debug, Default)]
pub struct LifecycleCell(AtomicU8);

impl LifecycleCell {
  pub fn new(lifecycle: Lifecycle) -> Self {
    Self(AtomicU8::new(lifecycle.to_u8()))
  }

  pub fn get(&self) -> Lifecycle {
    Lifecycle::from_u8(self.0.load(Ordering::Acquire))
  }

  pub fn set(&self, lifecycle: Lifecycle) {
    self.0.store(lifecycle.to_u8(), Ordering::Release);
  }
}

impl Clone for LifecycleCell {
  fn clone(&self) -> Self {
    Self::new(self.get())
  }
}

/// What a target should do with a change after applying the lifecycle policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
  /// Lifecycle is `Ignore`; do nothing.
  Skip,
  /// Actual state already matches.
  Unchanged,
  /// The object does not exist and should be created.
  Create,
  /// The object exists and should be updated.
  Update,
  /// The object differs but must not be modified.
  Warn { message: String },
}

/// Evaluate a change's lifecycle against the actual state of its object.
pub fn reconcile(change: &Change, actual: Option<&Value>) -> Result<Reconciliation, TaskError> {
  if change.lifecycle == Lifecycle::Ignore {
    return Ok(Reconciliation::Skip);
  }

  let Some(actual) = actual else {
    if change.lifecycle.requires_existing() {
      return Err(TaskError::NotFound {
        key: change.key.clone(),
        type_name: change.type_name.clone(),
        lifecycle: change.lifecycle,
      });
    }
    return Ok(Reconciliation::Create);
  };

  if *actual == change.desired {
    return Ok(Reconciliation::Unchanged);
  }

  let diff = describe_drift(actual, &change.desired);
  match change.lifecycle {
    Lifecycle::ExistsAndWarnIfChanges => {
      warn!(
        key = %change.key,
        type_name = %change.type_name,
        diff = %diff,
        "changes detected but not applied"
      );
      Ok(Reconciliation::Warn {
        message: format!("changes not applied: {diff}"),
      })
    }
    Lifecycle::ExistsAndValidates => Err(TaskError::Drift {
      key: change.key.clone(),
      type_name: change.type_name.clone(),
      lifecycle: change.lifecycle,
      diff,
    }),
    _ => Ok(Reconciliation::Update),
  }
}

/// Summarise which top-level fields differ.
fn describe_drift(actual: &Value, desired: &Value) -> String {
  match (actual, desired) {
    (Value::Object(a), Value::Object(d)) => {
      let changed: Vec<&str> = a
        .keys()
        .chain(d.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|k| a.get(*k) != d.get(*k))
        .map(|k| k.as_str())
        .collect();
      format!("fields changed: {}", changed.join(", "))
    }
    _ => format!("{actual} -> {desired}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn change(lifecycle: Lifecycle, desired: Value) -> Change {
    Change {
      key: "net".to_string(),
      type_name: "network".to_string(),
      lifecycle,
      desired,
    }
  }

  #[test]
  fn test_parse_lifecycle() {
    assert_eq!("Normal".parse::<Lifecycle>().unwrap(), Lifecycle::Normal);
    assert_eq!("Sync".parse::<Lifecycle>().unwrap(), Lifecycle::Normal);
    assert_eq!(
      "ExistsAndValidates".parse::<Lifecycle>().unwrap(),
      Lifecycle::ExistsAndValidates
    );
    assert!("Sometimes".parse::<Lifecycle>().is_err());
  }

  #[test]
  fn test_lifecycle_serde_accepts_sync_alias() {
    let lifecycle: Lifecycle = serde_json::from_str("\"Sync\"").unwrap();
    assert_eq!(lifecycle, Lifecycle::Normal);
    assert_eq!(
      serde_json::to_string(&Lifecycle::Ignore).unwrap(),
      "\"Ignore\""
    );
  }

  #[test]
  fn test_lifecycle_cell_roundtrip() {
    let cell = LifecycleCell::default();
    assert_eq!(cell.get(), Lifecycle::Normal);
    for lifecycle in Lifecycle::ALL {
      cell.set(lifecycle);
      assert_eq!(cell.get(), lifecycle);
    }
  }

  #[test]
  fn test_reconcile_normal() {
    let desired = json!({"cidr": "10.0.0.0/16"});
    let c = change(Lifecycle::Normal, desired.clone());

    assert_eq!(reconcile(&c, None).unwrap(), Reconciliation::Create);
    assert_eq!(
      reconcile(&c, Some(&desired)).unwrap(),
      Reconciliation::Unchanged
    );
    assert_eq!(
      reconcile(&c, Some(&json!({"cidr": "10.1.0.0/16"}))).unwrap(),
      Reconciliation::Update
    );
  }

  #[test]
  fn test_reconcile_ignore_never_looks_at_state() {
    let c = change(Lifecycle::Ignore, json!({}));
    assert_eq!(reconcile(&c, None).unwrap(), Reconciliation::Skip);
  }

  #[test]
  fn test_reconcile_exists_and_warn() {
    let c = change(Lifecycle::ExistsAndWarnIfChanges, json!({"cidr": "a"}));

    assert!(matches!(
      reconcile(&c, None),
      Err(TaskError::NotFound { .. })
    ));

    let result = reconcile(&c, Some(&json!({"cidr": "b"}))).unwrap();
    match result {
      Reconciliation::Warn { message } => assert!(message.contains("cidr")),
      other => panic!("expected warning, got {:?}", other),
    }
  }

  #[test]
  fn test_reconcile_exists_and_validates() {
    let c = change(Lifecycle::ExistsAndValidates, json!({"cidr": "a"}));

    assert!(matches!(
      reconcile(&c, None),
      Err(TaskError::NotFound { .. })
    ));
    assert!(matches!(
      reconcile(&c, Some(&json!({"cidr": "b"}))),
      Err(TaskError::Drift { .. })
    ));
    assert_eq!(
      reconcile(&c, Some(&json!({"cidr": "a"}))).unwrap(),
      Reconciliation::Unchanged
    );
  }

  #[test]
  fn test_tolerate_access_denied() {
    let denied = || Err(TaskError::access_denied("net", "read-only credentials"));

    let tolerated = Lifecycle::WarnIfInsufficientAccess.tolerate(denied());
    assert!(matches!(tolerated, Ok(RenderOutcome::Warned { .. })));

    let strict = Lifecycle::Normal.tolerate(denied());
    assert!(matches!(strict, Err(TaskError::AccessDenied { .. })));

    let other = Lifecycle::WarnIfInsufficientAccess.tolerate(Err(TaskError::target("boom")));
    assert!(matches!(other, Err(TaskError::Target { .. })));
  }
}

//! The backend a task renders against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;
use crate::lifecycle::Lifecycle;

/// A rendered task, as handed to a [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
  pub key: String,
  pub type_name: String,
  pub lifecycle: Lifecycle,
  pub desired: Value,
}

/// An action a dry run would have taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
  Create,
  Update,
}

/// Successful result of rendering a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenderOutcome {
  Created,
  Updated,
  Unchanged,
  /// Completed, but something needs an operator's attention.
  Warned { message: String },
  /// Lifecycle was `Ignore`.
  Ignored,
  /// Recorded by a dry run without being applied.
  Planned { action: PlannedAction },
}

impl RenderOutcome {
  /// Whether the target state was modified.
  pub fn is_change(&self) -> bool {
    matches!(self, Self::Created | Self::Updated)
  }
}

/// Performs (or records) the provisioning action for a rendered task.
///
/// Targets are shared by every task of a run and are called concurrently for
/// independent tasks; implementations must be safe for that.
#[async_trait]
pub trait Target: Send + Sync {
  fn name(&self) -> &str;

  /// Converge one object towards `change.desired`, honouring
  /// `change.lifecycle`.
  async fn apply(&self, change: Change) -> Result<RenderOutcome, TaskError>;
}

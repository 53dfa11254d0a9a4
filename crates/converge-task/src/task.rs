//! The task contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::inspect::{Inspect, Shape};
use crate::lifecycle::Lifecycle;
use crate::target::{Change, RenderOutcome, Target};
use crate::task_set::TaskSet;

/// A unit of declared infrastructure intent.
///
/// The key identifying a task is assigned by the [`TaskSet`] it is registered
/// in, not by the task itself. The task's own [`Inspect`] implementation
/// describes its fields so dependencies can be inferred from them.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct Subnet {
///   cidr: String,
///   network: Arc<Network>,
///   lifecycle: LifecycleCell,
/// }
///
/// impl Inspect for Subnet {
///   fn inspect(&self) -> Shape<'_> {
///     Shape::Record {
///       type_name: "Subnet",
///       fields: vec![("cidr", &self.cidr), ("network", &self.network)],
///     }
///   }
/// }
/// ```
#[async_trait]
pub trait Task: Inspect + Send + Sync + fmt::Debug {
  /// Category of the task, e.g. `network` or `instance`.
  fn type_name(&self) -> &str;

  fn lifecycle(&self) -> Lifecycle;

  fn set_lifecycle(&self, lifecycle: Lifecycle);

  /// Return `Some(self)` when the task declares its dependencies explicitly.
  /// Structural inference is then bypassed entirely.
  fn as_has_dependencies(&self) -> Option<&dyn HasDependencies> {
    None
  }

  /// Apply (or diff) the task's desired state against the context's target.
  async fn render(&self, ctx: &RenderContext<'_>) -> Result<RenderOutcome, TaskError>;
}

/// Values that know their own dependencies.
pub trait HasDependencies: Send + Sync {
  /// Return the tasks this value depends on. Every returned task must be a
  /// member of `tasks`.
  fn dependencies(&self, tasks: &TaskSet) -> Vec<Arc<dyn Task>>;
}

/// Marker field that hides a value from dependency inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotADependency;

impl HasDependencies for NotADependency {
  fn dependencies(&self, _tasks: &TaskSet) -> Vec<Arc<dyn Task>> {
    Vec::new()
  }
}

impl Inspect for NotADependency {
  fn inspect(&self) -> Shape<'_> {
    Shape::Explicit(self)
  }
}

/// Everything a task needs while rendering.
pub struct RenderContext<'a> {
  /// The task's key in its task set.
  pub key: &'a str,
  pub type_name: &'a str,
  /// Lifecycle captured when the task was dispatched.
  pub lifecycle: Lifecycle,
  pub target: &'a dyn Target,
  pub cancel: &'a CancellationToken,
}

impl RenderContext<'_> {
  /// Hand the desired state of this task to the target.
  pub async fn apply(&self, desired: Value) -> Result<RenderOutcome, TaskError> {
    if self.cancel.is_cancelled() {
      return Err(TaskError::Cancelled);
    }

    self
      .target
      .apply(Change {
        key: self.key.to_string(),
        type_name: self.type_name.to_string(),
        lifecycle: self.lifecycle,
        desired,
      })
      .await
  }
}

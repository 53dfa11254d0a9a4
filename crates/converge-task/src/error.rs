use thiserror::Error;

use crate::lifecycle::Lifecycle;

/// Errors a task can return from rendering against a target.
#[derive(Debug, Error)]
pub enum TaskError {
  /// The object does not exist but the lifecycle requires it to.
  #[error("{type_name} '{key}' not found, but lifecycle {lifecycle} requires it to exist")]
  NotFound {
    key: String,
    type_name: String,
    lifecycle: Lifecycle,
  },

  /// The object exists but differs from the desired state.
  #[error("{type_name} '{key}' does not match desired state under lifecycle {lifecycle}: {diff}")]
  Drift {
    key: String,
    type_name: String,
    lifecycle: Lifecycle,
    diff: String,
  },

  /// The target refused the operation for lack of permissions.
  #[error("access denied for '{key}': {message}")]
  AccessDenied { key: String, message: String },

  /// Rendering was cancelled before it completed.
  #[error("cancelled")]
  Cancelled,

  /// Rendering did not finish within the configured deadline.
  #[error("timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The target failed for a reason other than the ones above.
  #[error("target error: {message}")]
  Target { message: String },

  /// A resource could not produce its contents.
  #[error("resource error: {message}")]
  Resource { message: String },
}

impl TaskError {
  /// Create a generic target error.
  pub fn target(message: impl Into<String>) -> Self {
    Self::Target {
      message: message.into(),
    }
  }

  /// Create an access denied error.
  pub fn access_denied(key: impl Into<String>, message: impl Into<String>) -> Self {
    Self::AccessDenied {
      key: key.into(),
      message: message.into(),
    }
  }

  /// Whether this error is an authorization failure.
  pub fn is_access_denied(&self) -> bool {
    matches!(self, Self::AccessDenied { .. })
  }
}

/// Errors raised while assembling a [`TaskSet`](crate::TaskSet).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskSetError {
  /// Two tasks were registered under the same key.
  #[error("duplicate task key: {key}")]
  DuplicateKey { key: String },

  /// The same task instance was registered under two keys.
  #[error("task registered as '{key}' is already registered as '{existing}'")]
  DuplicateTask { key: String, existing: String },
}

/// A lifecycle name that is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown lifecycle: {0}")]
pub struct ParseLifecycleError(pub String);

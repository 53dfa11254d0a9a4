use std::path::PathBuf;

use converge_task::TaskSetError;
use thiserror::Error;

/// Errors that can occur while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid manifest: {0}")]
  Json(#[from] serde_json::Error),

  #[error("task '{task}' references unknown task '{reference}'")]
  UnknownReference { task: String, reference: String },

  #[error("task '{task}' property '{path}' has reserved key '{key}'; only $ref and $resource objects may use '$' keys")]
  ReservedKey {
    task: String,
    path: String,
    key: String,
  },

  #[error("unknown lifecycle '{value}' for {scope}")]
  UnknownLifecycle { scope: String, value: String },

  #[error(transparent)]
  TaskSet(#[from] TaskSetError),
}

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use converge_engine::ExecutorConfig;
use converge_task::{Lifecycle, Task, TaskSet};
use tracing::{debug, info};

use crate::config::{EngineSettings, ManifestDef};
use crate::error::ManifestError;
use crate::task::ManifestTask;

/// A loaded manifest: a linked task set plus the engine settings it declares.
#[derive(Debug)]
pub struct Manifest {
  pub engine: EngineSettings,
  pub tasks: TaskSet,
}

impl Manifest {
  /// Read and load a manifest file.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
      })?;
    let manifest = Self::from_json(&content)?;
    info!(path = %path.display(), tasks = manifest.tasks.len(), "loaded manifest");
    Ok(manifest)
  }

  pub fn from_json(json: &str) -> Result<Self, ManifestError> {
    let def: ManifestDef = serde_json::from_str(json)?;
    Self::from_def(def)
  }

  /// Build the task set described by `def`.
  ///
  /// Per-task lifecycles are applied first, then the kind overrides.
  pub fn from_def(def: ManifestDef) -> Result<Self, ManifestError> {
    let overrides = def
      .lifecycle_overrides
      .iter()
      .map(|(kind, value)| {
        parse_lifecycle(value, || format!("kind '{kind}'")).map(|l| (kind.clone(), l))
      })
      .collect::<Result<BTreeMap<_, _>, _>>()?;

    let mut built: BTreeMap<String, Arc<ManifestTask>> = BTreeMap::new();
    for (key, task_def) in def.tasks {
      for (name, value) in &task_def.properties {
        if let Some((path, reserved)) = value.find_reserved_key(name) {
          return Err(ManifestError::ReservedKey {
            task: key,
            path,
            key: reserved,
          });
        }
      }

      let lifecycle = match &task_def.lifecycle {
        Some(value) => parse_lifecycle(value, || format!("task '{key}'"))?,
        None => Lifecycle::default(),
      };
      let task = ManifestTask::new(task_def.kind, lifecycle).with_properties(task_def.properties);
      built.insert(key, Arc::new(task));
    }

    for (key, task) in &built {
      task.link(key, &built)?;
    }

    let tasks = TaskSet::from_tasks(
      built
        .into_iter()
        .map(|(key, task)| (key, task as Arc<dyn Task>)),
    )?;

    let changed = tasks.apply_lifecycle_overrides(&overrides);
    debug!(overrides = overrides.len(), changed, "applied lifecycle overrides");

    Ok(Self {
      engine: def.engine,
      tasks,
    })
  }

  pub fn executor_config(&self) -> ExecutorConfig {
    ExecutorConfig::from(&self.engine)
  }
}

fn parse_lifecycle(value: &str, scope: impl FnOnce() -> String) -> Result<Lifecycle, ManifestError> {
  Lifecycle::from_str(value).map_err(|_| ManifestError::UnknownLifecycle {
    scope: scope(),
    value: value.to_string(),
  })
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::TaskSetError;
use crate::lifecycle::Lifecycle;
use crate::task::Task;

/// Identity of a task instance: the address of the shared value.
///
/// Two references to the same `Arc` allocation have the same identity,
/// regardless of whether they are held as `Arc<T>` or `Arc<dyn Task>`.
pub fn task_identity(task: &dyn Task) -> usize {
  (task as *const dyn Task).cast::<()>() as usize
}

/// All tasks of a run, keyed by caller-chosen identifiers.
///
/// The set is unordered; execution order comes only from the dependency
/// graph built over it.
#[derive(Clone, Default)]
pub struct TaskSet {
  tasks: BTreeMap<String, Arc<dyn Task>>,
  identities: HashMap<usize, String>,
}

impl TaskSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a set from `(key, task)` pairs.
  pub fn from_tasks<I, K>(tasks: I) -> Result<Self, TaskSetError>
  where
    I: IntoIterator<Item = (K, Arc<dyn Task>)>,
    K: Into<String>,
  {
    let mut set = Self::new();
    for (key, task) in tasks {
      set.insert(key, task)?;
    }
    Ok(set)
  }

  /// Register a task under `key`.
  ///
  /// # Errors
  /// Fails if the key is taken or the same task instance is already registered.
  pub fn insert(&mut self, key: impl Into<String>, task: Arc<dyn Task>) -> Result<(), TaskSetError> {
    let key = key.into();
    if self.tasks.contains_key(&key) {
      return Err(TaskSetError::DuplicateKey { key });
    }

    let identity = task_identity(task.as_ref());
    if let Some(existing) = self.identities.get(&identity) {
      return Err(TaskSetError::DuplicateTask {
        key,
        existing: existing.clone(),
      });
    }

    self.identities.insert(identity, key.clone());
    self.tasks.insert(key, task);
    Ok(())
  }

  pub fn get(&self, key: &str) -> Option<&Arc<dyn Task>> {
    self.tasks.get(key)
  }

  /// Look up the key a task instance was registered under.
  pub fn key_of(&self, task: &dyn Task) -> Option<&str> {
    self
      .identities
      .get(&task_identity(task))
      .map(|k| k.as_str())
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.tasks.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Keys in ascending order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.tasks.keys().map(|k| k.as_str())
  }

  /// Tasks in ascending key order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Task>)> {
    self.tasks.iter().map(|(k, t)| (k.as_str(), t))
  }

  /// Replace the lifecycle of every task whose type has an override.
  ///
  /// Returns the number of tasks changed.
  pub fn apply_lifecycle_overrides(&self, overrides: &BTreeMap<String, Lifecycle>) -> usize {
    let mut changed = 0;
    for (key, task) in &self.tasks {
      if let Some(lifecycle) = overrides.get(task.type_name()) {
        if task.lifecycle() != *lifecycle {
          debug!(
            key = %key,
            type_name = task.type_name(),
            from = %task.lifecycle(),
            to = %lifecycle,
            "applying lifecycle override"
          );
          task.set_lifecycle(*lifecycle);
          changed += 1;
        }
      }
    }
    changed
  }
}

impl fmt::Debug for TaskSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map().entries(self.tasks.iter()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TaskError;
  use crate::inspect::{Inspect, Shape};
  use crate::lifecycle::LifecycleCell;
  use crate::target::RenderOutcome;
  use crate::task::RenderContext;
  use async_trait::async_trait;

  #[derive(Debug, Default)]
  struct Noop {
    kind: &'static str,
    lifecycle: LifecycleCell,
  }

  impl Inspect for Noop {
    fn inspect(&self) -> Shape<'_> {
      Shape::Record {
        type_name: "Noop",
        fields: Vec::new(),
      }
    }
  }

  #[async_trait]
  impl Task for Noop {
    fn type_name(&self) -> &str {
      self.kind
    }

    fn lifecycle(&self) -> Lifecycle {
      self.lifecycle.get()
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
      self.lifecycle.set(lifecycle);
    }

    async fn render(&self, _ctx: &RenderContext<'_>) -> Result<RenderOutcome, TaskError> {
      Ok(RenderOutcome::Unchanged)
    }
  }

  fn noop(kind: &'static str) -> Arc<dyn Task> {
    Arc::new(Noop {
      kind,
      ..Default::default()
    })
  }

  #[test]
  fn test_insert_and_lookup() {
    let net = noop("network");
    let mut set = TaskSet::new();
    set.insert("net", net.clone()).unwrap();

    assert_eq!(set.len(), 1);
    assert!(set.contains_key("net"));
    assert_eq!(set.key_of(net.as_ref()), Some("net"));
    assert_eq!(set.key_of(noop("network").as_ref()), None);
  }

  #[test]
  fn test_duplicate_key_rejected() {
    let mut set = TaskSet::new();
    set.insert("net", noop("network")).unwrap();
    assert_eq!(
      set.insert("net", noop("network")),
      Err(TaskSetError::DuplicateKey {
        key: "net".to_string()
      })
    );
  }

  #[test]
  fn test_duplicate_instance_rejected() {
    let net = noop("network");
    let mut set = TaskSet::new();
    set.insert("a", net.clone()).unwrap();
    assert_eq!(
      set.insert("b", net),
      Err(TaskSetError::DuplicateTask {
        key: "b".to_string(),
        existing: "a".to_string()
      })
    );
  }

  #[test]
  fn test_identity_survives_unsizing() {
    let concrete = Arc::new(Noop {
      kind: "network",
      ..Default::default()
    });
    let erased: Arc<dyn Task> = concrete.clone();
    assert_eq!(task_identity(concrete.as_ref()), task_identity(erased.as_ref()));
  }

  #[test]
  fn test_lifecycle_overrides() {
    let set = TaskSet::from_tasks([
      ("net", noop("network")),
      ("sub", noop("subnet")),
      ("vm", noop("instance")),
    ])
    .unwrap();

    let mut overrides = BTreeMap::new();
    overrides.insert("network".to_string(), Lifecycle::ExistsAndWarnIfChanges);
    overrides.insert("instance".to_string(), Lifecycle::Normal);

    assert_eq!(set.apply_lifecycle_overrides(&overrides), 1);
    assert_eq!(
      set.get("net").unwrap().lifecycle(),
      Lifecycle::ExistsAndWarnIfChanges
    );
    assert_eq!(set.get("sub").unwrap().lifecycle(), Lifecycle::Normal);
  }
}

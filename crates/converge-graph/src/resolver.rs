//! Dependency discovery.
//!
//! A task that declares its dependencies is asked for them. Every other task
//! is walked field by field and each reachable value is classified by its
//! [`Shape`].

use std::collections::BTreeMap;
use std::sync::Arc;

use converge_task::{FieldPath, HasDependencies, Inspect, PathSegment, Shape, Task, TaskSet};
use tracing::debug;

use crate::error::GraphError;

/// Discover the dependencies of every task in the set.
///
/// Returns a map from each task key to the keys it depends on, in discovery
/// order and without duplicates.
pub fn find_task_dependencies(
  tasks: &TaskSet,
) -> Result<BTreeMap<String, Vec<String>>, GraphError> {
  let mut edges = BTreeMap::new();

  for (key, task) in tasks.iter() {
    let mut walker = Walker::new(tasks, key);
    match task.as_has_dependencies() {
      Some(explicit) => walker.add_explicit(explicit)?,
      None => walker.walk_root(task.as_ref())?,
    }
    edges.insert(key.to_string(), walker.found);
  }

  debug!("dependencies:");
  for (key, dependencies) in &edges {
    debug!(task = %key, dependencies = ?dependencies, "task dependencies");
  }

  Ok(edges)
}

/// Infer the dependencies of an arbitrary value.
///
/// `owner` names the value in error messages.
pub fn find_dependencies(
  tasks: &TaskSet,
  owner: &str,
  value: &dyn Inspect,
) -> Result<Vec<String>, GraphError> {
  let mut walker = Walker::new(tasks, owner);
  walker.walk_root(value)?;
  Ok(walker.found)
}

struct Walker<'t> {
  tasks: &'t TaskSet,
  owner: &'t str,
  path: FieldPath,
  found: Vec<String>,
}

impl<'t> Walker<'t> {
  fn new(tasks: &'t TaskSet, owner: &'t str) -> Self {
    Self {
      tasks,
      owner,
      path: FieldPath::new(),
      found: Vec::new(),
    }
  }

  /// Walk the value being resolved. It is never its own dependency.
  fn walk_root(&mut self, value: &dyn Inspect) -> Result<(), GraphError> {
    match value.inspect() {
      Shape::Explicit(explicit) => self.add_explicit(explicit),
      Shape::Task(task) => match task.as_has_dependencies() {
        Some(explicit) => self.add_explicit(explicit),
        None => self.walk_fields(task.inspect()),
      },
      shape => self.walk_fields(shape),
    }
  }

  fn walk_fields(&mut self, shape: Shape<'_>) -> Result<(), GraphError> {
    match shape {
      Shape::Record { fields, .. } => {
        for (name, value) in fields {
          self.path.push(PathSegment::Field(name.to_string()));
          self.visit(value)?;
          self.path.pop();
        }
        Ok(())
      }
      Shape::Task(_) => Ok(()),
      shape => self.visit_shape(shape),
    }
  }

  fn visit(&mut self, value: &dyn Inspect) -> Result<(), GraphError> {
    self.visit_shape(value.inspect())
  }

  fn visit_shape(&mut self, shape: Shape<'_>) -> Result<(), GraphError> {
    match shape {
      Shape::Scalar => Ok(()),
      Shape::Optional(value) => match value {
        Some(value) => self.visit(value),
        None => Ok(()),
      },
      Shape::Sequence(items) => {
        for (index, item) in items.into_iter().enumerate() {
          self.path.push(PathSegment::Index(index));
          self.visit(item)?;
          self.path.pop();
        }
        Ok(())
      }
      Shape::Mapping(entries) => {
        for (key, value) in entries {
          self.path.push(PathSegment::Key(key));
          self.visit(value)?;
          self.path.pop();
        }
        Ok(())
      }
      Shape::Explicit(explicit) => self.add_explicit(explicit),
      // Explicit dependencies take precedence over the reference itself.
      Shape::Task(task) => match task.as_has_dependencies() {
        Some(explicit) => self.add_explicit(explicit),
        None => self.add_task(task),
      },
      Shape::Resource(resource) => match resource.as_has_dependencies() {
        Some(explicit) => self.add_explicit(explicit),
        None => Ok(()),
      },
      Shape::Record { type_name, .. } => Err(GraphError::Unclassifiable {
        task: self.owner.to_string(),
        path: self.path.to_string(),
        type_name: type_name.to_string(),
      }),
    }
  }

  fn add_explicit(&mut self, explicit: &dyn HasDependencies) -> Result<(), GraphError> {
    let dependencies: Vec<Arc<dyn Task>> = explicit.dependencies(self.tasks);
    for dependency in &dependencies {
      self.add_task(dependency.as_ref())?;
    }
    Ok(())
  }

  fn add_task(&mut self, task: &dyn Task) -> Result<(), GraphError> {
    let key = self
      .tasks
      .key_of(task)
      .ok_or_else(|| GraphError::DependencyNotFound {
        task: self.owner.to_string(),
        path: self.path.to_string(),
        type_name: task.type_name().to_string(),
      })?;

    if !self.found.iter().any(|k| k == key) {
      self.found.push(key.to_string());
    }
    Ok(())
  }
}

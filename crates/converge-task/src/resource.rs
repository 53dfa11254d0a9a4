//! Resources: data produced as a side effect of rendering a task.
//!
//! A resource field is not an ordering dependency. The exception is
//! [`TaskDependentResource`], which names the task that produces it.

use std::fmt;
use std::sync::Arc;

use crate::error::TaskError;
use crate::inspect::{Inspect, Shape};
use crate::task::{HasDependencies, Task};
use crate::task_set::TaskSet;

pub trait Resource: Send + Sync + fmt::Debug {
  fn contents(&self) -> Result<Vec<u8>, TaskError>;

  /// Return `Some(self)` when the resource must wait on the task producing it.
  fn as_has_dependencies(&self) -> Option<&dyn HasDependencies> {
    None
  }

  /// Contents decoded as UTF-8.
  fn contents_string(&self) -> Result<String, TaskError> {
    String::from_utf8(self.contents()?).map_err(|e| TaskError::Resource {
      message: format!("resource is not valid utf-8: {}", e),
    })
  }
}

/// A resource with fixed text contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringResource(pub String);

impl StringResource {
  pub fn new(contents: impl Into<String>) -> Self {
    Self(contents.into())
  }
}

impl Resource for StringResource {
  fn contents(&self) -> Result<Vec<u8>, TaskError> {
    Ok(self.0.as_bytes().to_vec())
  }
}

impl Inspect for StringResource {
  fn inspect(&self) -> Shape<'_> {
    Shape::Resource(self)
  }
}

/// A resource with fixed binary contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesResource(pub Vec<u8>);

impl Resource for BytesResource {
  fn contents(&self) -> Result<Vec<u8>, TaskError> {
    Ok(self.0.clone())
  }
}

impl Inspect for BytesResource {
  fn inspect(&self) -> Shape<'_> {
    Shape::Resource(self)
  }
}

/// A resource whose contents only exist once `task` has been rendered.
#[derive(Debug, Clone)]
pub struct TaskDependentResource {
  pub resource: Arc<dyn Resource>,
  pub task: Arc<dyn Task>,
}

impl TaskDependentResource {
  pub fn new(resource: Arc<dyn Resource>, task: Arc<dyn Task>) -> Self {
    Self { resource, task }
  }
}

impl Resource for TaskDependentResource {
  fn contents(&self) -> Result<Vec<u8>, TaskError> {
    self.resource.contents()
  }

  fn as_has_dependencies(&self) -> Option<&dyn HasDependencies> {
    Some(self)
  }
}

impl HasDependencies for TaskDependentResource {
  fn dependencies(&self, _tasks: &TaskSet) -> Vec<Arc<dyn Task>> {
    vec![self.task.clone()]
  }
}

impl Inspect for TaskDependentResource {
  fn inspect(&self) -> Shape<'_> {
    Shape::Resource(self)
  }
}

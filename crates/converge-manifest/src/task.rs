use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use converge_task::{
  Inspect, Lifecycle, LifecycleCell, RenderContext, RenderOutcome, Resource, Shape,
  StringResource, Task, TaskDependentResource, TaskError,
};
use serde_json::{Map, Value};

use crate::config::PropertyValue;
use crate::error::ManifestError;

/// A task declared in a manifest.
///
/// Its dependencies are inferred from its properties: every `$ref` is a
/// dependency, plain values and unproduced resources are not.
#[derive(Debug)]
pub struct ManifestTask {
  kind: String,
  lifecycle: LifecycleCell,
  properties: BTreeMap<String, Property>,
}

impl ManifestTask {
  pub fn new(kind: impl Into<String>, lifecycle: Lifecycle) -> Self {
    Self {
      kind: kind.into(),
      lifecycle: LifecycleCell::new(lifecycle),
      properties: BTreeMap::new(),
    }
  }

  pub fn with_properties(mut self, properties: BTreeMap<String, PropertyValue>) -> Self {
    self.properties = properties
      .into_iter()
      .map(|(name, value)| (name, Property::from(value)))
      .collect();
    self
  }

  pub fn property(&self, name: &str) -> Option<&Property> {
    self.properties.get(name)
  }

  /// Point every reference and produced resource at its task.
  pub(crate) fn link(
    &self,
    key: &str,
    tasks: &BTreeMap<String, Arc<ManifestTask>>,
  ) -> Result<(), ManifestError> {
    for property in self.properties.values() {
      property.link(key, tasks)?;
    }
    Ok(())
  }

  /// The desired state handed to the target.
  pub fn desired(&self) -> Result<Value, TaskError> {
    let mut object = Map::new();
    for (name, property) in &self.properties {
      object.insert(name.clone(), property.to_value()?);
    }
    Ok(Value::Object(object))
  }
}

impl Inspect for ManifestTask {
  fn inspect(&self) -> Shape<'_> {
    Shape::Record {
      type_name: "ManifestTask",
      fields: self
        .properties
        .iter()
        .map(|(name, property)| (name.as_str(), property as &dyn Inspect))
        .collect(),
    }
  }
}

#[async_trait]
impl Task for ManifestTask {
  fn type_name(&self) -> &str {
    &self.kind
  }

  fn lifecycle(&self) -> Lifecycle {
    self.lifecycle.get()
  }

  fn set_lifecycle(&self, lifecycle: Lifecycle) {
    self.lifecycle.set(lifecycle);
  }

  async fn render(&self, ctx: &RenderContext<'_>) -> Result<RenderOutcome, TaskError> {
    ctx.apply(self.desired()?).await
  }
}

/// A resolved property value.
#[derive(Debug)]
pub enum Property {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  List(Vec<Property>),
  Map(BTreeMap<String, Property>),
  Ref(TaskRef),
  Resource(ResourceSlot),
}

impl From<PropertyValue> for Property {
  fn from(value: PropertyValue) -> Self {
    match value {
      PropertyValue::Null => Property::Null,
      PropertyValue::Bool(b) => Property::Bool(b),
      PropertyValue::Number(n) => Property::Number(n),
      PropertyValue::String(s) => Property::String(s),
      PropertyValue::List(items) => Property::List(items.into_iter().map(Property::from).collect()),
      PropertyValue::Map(entries) => Property::Map(
        entries
          .into_iter()
          .map(|(k, v)| (k, Property::from(v)))
          .collect(),
      ),
      PropertyValue::Ref(r) => Property::Ref(TaskRef {
        key: r.reference,
        task: OnceLock::new(),
      }),
      PropertyValue::Resource(r) => Property::Resource(ResourceSlot {
        contents: r.contents,
        produced_by: r.produced_by,
        resource: OnceLock::new(),
      }),
    }
  }
}

impl Property {
  fn link(&self, owner: &str, tasks: &BTreeMap<String, Arc<ManifestTask>>) -> Result<(), ManifestError> {
    match self {
      Property::List(items) => items.iter().try_for_each(|p| p.link(owner, tasks)),
      Property::Map(entries) => entries.values().try_for_each(|p| p.link(owner, tasks)),
      Property::Ref(task_ref) => {
        let task = lookup(owner, &task_ref.key, tasks)?;
        let _ = task_ref.task.set(task);
        Ok(())
      }
      Property::Resource(slot) => {
        let contents: Arc<dyn Resource> = Arc::new(StringResource::new(slot.contents.clone()));
        let resource: Arc<dyn Resource> = match &slot.produced_by {
          Some(producer) => {
            let task: Arc<dyn Task> = lookup(owner, producer, tasks)?;
            Arc::new(TaskDependentResource::new(contents, task))
          }
          None => contents,
        };
        let _ = slot.resource.set(resource);
        Ok(())
      }
      _ => Ok(()),
    }
  }

  fn to_value(&self) -> Result<Value, TaskError> {
    Ok(match self {
      Property::Null => Value::Null,
      Property::Bool(b) => Value::Bool(*b),
      Property::Number(n) => Value::Number(n.clone()),
      Property::String(s) => Value::String(s.clone()),
      Property::List(items) => Value::Array(
        items
          .iter()
          .map(Property::to_value)
          .collect::<Result<_, _>>()?,
      ),
      Property::Map(entries) => {
        let mut object = Map::new();
        for (k, v) in entries {
          object.insert(k.clone(), v.to_value()?);
        }
        Value::Object(object)
      }
      Property::Ref(task_ref) => Value::String(task_ref.key.clone()),
      Property::Resource(slot) => match slot.resource.get() {
        Some(resource) => Value::String(resource.contents_string()?),
        None => Value::String(slot.contents.clone()),
      },
    })
  }
}

impl Inspect for Property {
  fn inspect(&self) -> Shape<'_> {
    match self {
      Property::Null | Property::Bool(_) | Property::Number(_) | Property::String(_) => {
        Shape::Scalar
      }
      Property::List(items) => Shape::Sequence(items.iter().map(|p| p as &dyn Inspect).collect()),
      Property::Map(entries) => Shape::Mapping(
        entries
          .iter()
          .map(|(k, v)| (k.clone(), v as &dyn Inspect))
          .collect(),
      ),
      Property::Ref(task_ref) => match task_ref.task.get() {
        Some(task) => Shape::Task(task.as_ref()),
        None => Shape::Optional(None),
      },
      Property::Resource(slot) => match slot.resource.get() {
        Some(resource) => Shape::Resource(resource.as_ref()),
        None => Shape::Scalar,
      },
    }
  }
}

/// A `$ref` property, bound to its task once the manifest is linked.
pub struct TaskRef {
  key: String,
  task: OnceLock<Arc<ManifestTask>>,
}

impl TaskRef {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl fmt::Debug for TaskRef {
  // Only the key: references may form cycles.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("TaskRef").field(&self.key).finish()
  }
}

/// A `$resource` property, optionally produced by another task.
pub struct ResourceSlot {
  contents: String,
  produced_by: Option<String>,
  resource: OnceLock<Arc<dyn Resource>>,
}

impl ResourceSlot {
  pub fn produced_by(&self) -> Option<&str> {
    self.produced_by.as_deref()
  }
}

impl fmt::Debug for ResourceSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceSlot")
      .field("contents", &self.contents)
      .field("produced_by", &self.produced_by)
      .finish()
  }
}

fn lookup(
  owner: &str,
  reference: &str,
  tasks: &BTreeMap<String, Arc<ManifestTask>>,
) -> Result<Arc<ManifestTask>, ManifestError> {
  tasks
    .get(reference)
    .cloned()
    .ok_or_else(|| ManifestError::UnknownReference {
      task: owner.to_string(),
      reference: reference.to_string(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{RefValue, ResourceValue};
  use serde_json::json;

  fn linked(entries: Vec<(&str, ManifestTask)>) -> BTreeMap<String, Arc<ManifestTask>> {
    let tasks: BTreeMap<String, Arc<ManifestTask>> = entries
      .into_iter()
      .map(|(key, task)| (key.to_string(), Arc::new(task)))
      .collect();
    for (key, task) in &tasks {
      task.link(key, &tasks).unwrap();
    }
    tasks
  }

  #[test]
  fn test_properties_after_linking() {
    let vm = ManifestTask::new("instance", Lifecycle::Normal).with_properties(BTreeMap::from([
      (
        "subnet".to_string(),
        PropertyValue::Ref(RefValue {
          reference: "sub".to_string(),
        }),
      ),
      (
        "user_data".to_string(),
        PropertyValue::Resource(ResourceValue {
          contents: "#cloud-config".to_string(),
          produced_by: Some("boot".to_string()),
        }),
      ),
    ]));
    let tasks = linked(vec![
      ("sub", ManifestTask::new("subnet", Lifecycle::Normal)),
      ("boot", ManifestTask::new("bootstrap", Lifecycle::Normal)),
      ("vm", vm),
    ]);
    let vm = &tasks["vm"];

    match vm.property("subnet") {
      Some(Property::Ref(task_ref)) => assert_eq!(task_ref.key(), "sub"),
      other => panic!("expected reference, got {:?}", other),
    }
    match vm.property("user_data") {
      Some(Property::Resource(slot)) => assert_eq!(slot.produced_by(), Some("boot")),
      other => panic!("expected resource, got {:?}", other),
    }
    assert!(vm.property("missing").is_none());

    assert_eq!(
      vm.desired().unwrap(),
      json!({ "subnet": "sub", "user_data": "#cloud-config" })
    );
  }

  #[test]
  fn test_link_reports_unknown_reference() {
    let task = ManifestTask::new("subnet", Lifecycle::Normal).with_properties(BTreeMap::from([(
      "network".to_string(),
      PropertyValue::List(vec![PropertyValue::Ref(RefValue {
        reference: "ghost".to_string(),
      })]),
    )]));
    let tasks = BTreeMap::from([("sub".to_string(), Arc::new(task))]);

    let err = tasks["sub"].link("sub", &tasks).unwrap_err();
    assert!(matches!(err, ManifestError::UnknownReference { .. }));
  }
}

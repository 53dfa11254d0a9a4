//! Serializable manifest types, before references are resolved.

use std::collections::BTreeMap;
use std::time::Duration;

use converge_engine::ExecutorConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDef {
  #[serde(default)]
  pub engine: EngineSettings,
  /// Lifecycle by task kind; applied to every task of that kind.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub lifecycle_overrides: BTreeMap<String, String>,
  pub tasks: BTreeMap<String, TaskDef>,
}

/// Executor settings carried in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_concurrency: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_timeout_ms: Option<u64>,
}

impl From<&EngineSettings> for ExecutorConfig {
  fn from(settings: &EngineSettings) -> Self {
    ExecutorConfig {
      max_concurrency: settings.max_concurrency,
      task_timeout: settings.task_timeout_ms.map(Duration::from_millis),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  pub kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lifecycle: Option<String>,
  #[serde(default)]
  pub properties: BTreeMap<String, PropertyValue>,
}

/// A property value as written in the manifest.
///
/// ```json
/// {
///   "cidr": "10.0.0.0/16",
///   "network": { "$ref": "net" },
///   "user_data": { "$resource": "#cloud-config", "$produced_by": "bootstrap" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  Ref(RefValue),
  Resource(ResourceValue),
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  List(Vec<PropertyValue>),
  Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
  /// Find a map key starting with `$` outside of a `$ref` or `$resource`
  /// object. Returns the path of the map and the offending key.
  ///
  /// Such keys are a malformed reference or resource, which would otherwise
  /// load as a plain map and lose the dependency.
  pub fn find_reserved_key(&self, path: &str) -> Option<(String, String)> {
    match self {
      PropertyValue::List(items) => items
        .iter()
        .enumerate()
        .find_map(|(index, item)| item.find_reserved_key(&format!("{path}[{index}]"))),
      PropertyValue::Map(entries) => {
        if let Some(key) = entries.keys().find(|k| k.starts_with('$')) {
          return Some((path.to_string(), key.clone()));
        }
        entries
          .iter()
          .find_map(|(key, value)| value.find_reserved_key(&format!("{path}.{key}")))
      }
      _ => None,
    }
  }
}

/// A reference to another task of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefValue {
  #[serde(rename = "$ref")]
  pub reference: String,
}

/// Inline resource contents, optionally produced by another task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceValue {
  #[serde(rename = "$resource")]
  pub contents: String,
  #[serde(
    rename = "$produced_by",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub produced_by: Option<String>,
}

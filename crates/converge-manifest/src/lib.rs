//! Converge Manifest
//!
//! Declarative task sets loaded from JSON. Each task has a kind, an optional
//! lifecycle and a map of properties; properties written as `{"$ref": key}`
//! make the task depend on `key`.
//!
//! ```json
//! {
//!   "engine": { "max_concurrency": 8, "task_timeout_ms": 60000 },
//!   "lifecycle_overrides": { "network": "ExistsAndWarnIfChanges" },
//!   "tasks": {
//!     "net": { "kind": "network", "properties": { "cidr": "10.0.0.0/16" } },
//!     "sub": { "kind": "subnet", "properties": { "network": { "$ref": "net" } } }
//!   }
//! }
//! ```

mod config;
mod error;
mod manifest;
mod task;

pub use config::{EngineSettings, ManifestDef, PropertyValue, RefValue, ResourceValue, TaskDef};
pub use error::ManifestError;
pub use manifest::Manifest;
pub use task::{ManifestTask, Property, ResourceSlot, TaskRef};

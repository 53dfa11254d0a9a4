//! Converge Task
//!
//! This crate defines the contract every provisionable operation satisfies.
//! A task has a stable key (assigned by the [`TaskSet`] it is registered in),
//! a [`Lifecycle`] policy, an optional explicit dependency declaration, and a
//! render operation against a pluggable [`Target`].
//!
//! Task data is made visible to dependency inference through the [`Inspect`]
//! trait, which classifies every reachable value as one of a closed set of
//! [`Shape`]s:
//!
//! ```text
//! Scalar      numbers, booleans, strings        -> never a dependency
//! Optional    Option<T>                          -> walked
//! Sequence    Vec<T>, [T]                        -> walked
//! Mapping     BTreeMap<K, V>, HashMap<K, V>      -> values walked
//! Explicit    HasDependencies values             -> asked for dependencies
//! Task        Arc<T: Task>, Arc<dyn Task>        -> a dependency
//! Resource    data produced by another task      -> ignored unless explicit
//! Record      the task's own fields              -> only valid at the top level
//! ```

mod error;
mod inspect;
mod lifecycle;
mod resource;
mod target;
mod task;
mod task_set;

pub use error::{ParseLifecycleError, TaskError, TaskSetError};
pub use inspect::{FieldPath, Inspect, PathSegment, Shape};
pub use lifecycle::{Lifecycle, LifecycleCell, Reconciliation, reconcile};
pub use resource::{BytesResource, Resource, StringResource, TaskDependentResource};
pub use target::{Change, PlannedAction, RenderOutcome, Target};
pub use task::{HasDependencies, NotADependency, RenderContext, Task};
pub use task_set::{TaskSet, task_identity};

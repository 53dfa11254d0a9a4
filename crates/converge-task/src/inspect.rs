//! Structural classification of task data.
//!
//! Dependency inference never looks at concrete types; it only sees the
//! [`Shape`] each value reports about itself.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::resource::Resource;
use crate::task::{HasDependencies, Task};

/// The structural kind of a value reachable from a task.
pub enum Shape<'a> {
  /// Numbers, booleans and strings. Never a dependency.
  Scalar,
  /// An optional value; walked when present.
  Optional(Option<&'a dyn Inspect>),
  /// An ordered sequence; every element is walked.
  Sequence(Vec<&'a dyn Inspect>),
  /// A key-unordered mapping; every value is walked.
  Mapping(Vec<(String, &'a dyn Inspect)>),
  /// A value that declares its own dependencies.
  Explicit(&'a dyn HasDependencies),
  /// A reference to another task.
  Task(&'a dyn Task),
  /// Data produced by a task.
  Resource(&'a dyn Resource),
  /// A value with named fields. Only the value being inspected may be a
  /// record; a nested record cannot be classified.
  Record {
    type_name: &'static str,
    fields: Vec<(&'a str, &'a dyn Inspect)>,
  },
}

impl Shape<'_> {
  /// Short name of the variant, used in diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Shape::Scalar => "scalar",
      Shape::Optional(_) => "optional",
      Shape::Sequence(_) => "sequence",
      Shape::Mapping(_) => "mapping",
      Shape::Explicit(_) => "explicit",
      Shape::Task(_) => "task",
      Shape::Resource(_) => "resource",
      Shape::Record { .. } => "record",
    }
  }
}

/// Types whose structure can be walked for dependency inference.
///
/// `Option` has an inherent `inspect` method, so `field.inspect()` on an
/// `Option` field does not reach this trait. Call `Inspect::inspect(&field)`
/// there.
pub trait Inspect {
  fn inspect(&self) -> Shape<'_>;
}

/// One step from a task down to a nested value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
  Field(String),
  Index(usize),
  Key(String),
}

/// The location of a nested value, e.g. `spec.subnets[2]` or `tags["env"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn push(&mut self, segment: PathSegment) {
    self.0.push(segment);
  }

  pub fn pop(&mut self) {
    self.0.pop();
  }

  pub fn segments(&self) -> &[PathSegment] {
    &self.0
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return f.write_str("<root>");
    }
    for (i, segment) in self.0.iter().enumerate() {
      match segment {
        PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
        PathSegment::Field(name) => write!(f, ".{name}")?,
        PathSegment::Index(index) => write!(f, "[{index}]")?,
        PathSegment::Key(key) => write!(f, "[{key}]")?,
      }
    }
    Ok(())
  }
}

macro_rules! impl_scalar {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Inspect for $ty {
        fn inspect(&self) -> Shape<'_> {
          Shape::Scalar
        }
      }
    )*
  };
}

impl_scalar!(
  bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
  str,
);

impl<T: Inspect + ?Sized> Inspect for &T {
  fn inspect(&self) -> Shape<'_> {
    (**self).inspect()
  }
}

impl<T: Inspect + ?Sized> Inspect for Box<T> {
  fn inspect(&self) -> Shape<'_> {
    (**self).inspect()
  }
}

impl<T: Inspect> Inspect for Option<T> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Optional(self.as_ref().map(|v| v as &dyn Inspect))
  }
}

impl<T: Inspect> Inspect for Vec<T> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Sequence(self.iter().map(|v| v as &dyn Inspect).collect())
  }
}

impl<T: Inspect> Inspect for [T] {
  fn inspect(&self) -> Shape<'_> {
    Shape::Sequence(self.iter().map(|v| v as &dyn Inspect).collect())
  }
}

impl<K: fmt::Debug, V: Inspect> Inspect for BTreeMap<K, V> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Mapping(
      self
        .iter()
        .map(|(k, v)| (format!("{k:?}"), v as &dyn Inspect))
        .collect(),
    )
  }
}

impl<K: fmt::Debug, V: Inspect, S> Inspect for HashMap<K, V, S> {
  fn inspect(&self) -> Shape<'_> {
    let mut entries: Vec<(String, &dyn Inspect)> = self
      .iter()
      .map(|(k, v)| (format!("{k:?}"), v as &dyn Inspect))
      .collect();
    // Iteration order is random; keep diagnostics stable.
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Shape::Mapping(entries)
  }
}

impl<T: Task> Inspect for Arc<T> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Task(self.as_ref())
  }
}

impl Inspect for Arc<dyn Task> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Task(self.as_ref())
  }
}

impl Inspect for Arc<dyn Resource> {
  fn inspect(&self) -> Shape<'_> {
    Shape::Resource(self.as_ref())
  }
}

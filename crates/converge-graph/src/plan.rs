use serde::{Deserialize, Serialize};

/// Tasks grouped into levels that can each run concurrently.
///
/// Every task in level `n` depends only on tasks in levels below `n`, and at
/// least one of its dependencies is in level `n - 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
  levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
  pub fn new(levels: Vec<Vec<String>>) -> Self {
    Self { levels }
  }

  pub fn levels(&self) -> &[Vec<String>] {
    &self.levels
  }

  /// Number of levels.
  pub fn depth(&self) -> usize {
    self.levels.len()
  }

  /// Number of tasks across all levels.
  pub fn len(&self) -> usize {
    self.levels.iter().map(|l| l.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.levels.iter().all(|l| l.is_empty())
  }

  pub fn level_of(&self, key: &str) -> Option<usize> {
    self
      .levels
      .iter()
      .position(|level| level.iter().any(|k| k == key))
  }

  /// All keys in execution order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.levels.iter().flatten().map(|k| k.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plan_serializes_as_levels() {
    let plan = ExecutionPlan::new(vec![
      vec!["net".to_string()],
      vec!["sub".to_string(), "vol".to_string()],
    ]);
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "levels": [["net"], ["sub", "vol"]] })
    );
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.level_of("vol"), Some(1));
    assert_eq!(plan.level_of("vm"), None);
    assert_eq!(plan.keys().collect::<Vec<_>>(), vec!["net", "sub", "vol"]);
  }
}

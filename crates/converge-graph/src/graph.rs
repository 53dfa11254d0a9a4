use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use converge_task::TaskSet;
use tracing::{debug, info};

use crate::error::GraphError;
use crate::plan::ExecutionPlan;
use crate::resolver::find_task_dependencies;

/// Validated, acyclic dependency graph over the keys of a task set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
  /// key -> keys it depends on.
  dependencies: BTreeMap<String, BTreeSet<String>>,
  /// key -> keys that depend on it.
  dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
  /// Infer dependencies for every task and validate the resulting graph.
  pub fn build(tasks: &TaskSet) -> Result<Self, GraphError> {
    let edges = find_task_dependencies(tasks)?;
    let graph = Self::from_edges(&edges)?;
    info!(
      tasks = graph.len(),
      edges = graph.edge_count(),
      "built dependency graph"
    );
    Ok(graph)
  }

  /// Build a graph from a `key -> dependencies` table.
  ///
  /// Every dependency must itself be a key of the table, and the graph must
  /// be acyclic.
  pub fn from_edges(edges: &BTreeMap<String, Vec<String>>) -> Result<Self, GraphError> {
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    // Initialize all nodes
    for key in edges.keys() {
      dependencies.entry(key.clone()).or_default();
      dependents.entry(key.clone()).or_default();
    }

    for (key, deps) in edges {
      for dependency in deps {
        if !edges.contains_key(dependency) {
          return Err(GraphError::UnknownTask {
            task: key.clone(),
            dependency: dependency.clone(),
          });
        }
        dependencies
          .entry(key.clone())
          .or_default()
          .insert(dependency.clone());
        dependents
          .entry(dependency.clone())
          .or_default()
          .insert(key.clone());
      }
    }

    let graph = Self {
      dependencies,
      dependents,
    };

    if let Some(cycle) = graph.find_cycle() {
      return Err(GraphError::CycleDetected { cycle });
    }

    Ok(graph)
  }

  pub fn len(&self) -> usize {
    self.dependencies.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dependencies.is_empty()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.dependencies.contains_key(key)
  }

  pub fn edge_count(&self) -> usize {
    self.dependencies.values().map(|d| d.len()).sum()
  }

  /// Keys in ascending order.
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.dependencies.keys().map(|k| k.as_str())
  }

  /// Keys `key` depends on, in ascending order.
  pub fn dependencies(&self, key: &str) -> impl Iterator<Item = &str> {
    self
      .dependencies
      .get(key)
      .into_iter()
      .flatten()
      .map(|k| k.as_str())
  }

  /// Keys that depend on `key`, in ascending order.
  pub fn dependents(&self, key: &str) -> impl Iterator<Item = &str> {
    self
      .dependents
      .get(key)
      .into_iter()
      .flatten()
      .map(|k| k.as_str())
  }

  /// Tasks without dependencies.
  pub fn roots(&self) -> Vec<&str> {
    self
      .dependencies
      .iter()
      .filter(|(_, deps)| deps.is_empty())
      .map(|(k, _)| k.as_str())
      .collect()
  }

  /// Every key that depends on `key`, directly or not.
  pub fn transitive_dependents(&self, key: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = self.dependents(key).collect();
    while let Some(next) = queue.pop_front() {
      if seen.insert(next.to_string()) {
        queue.extend(self.dependents(next));
      }
    }
    seen
  }

  /// Group tasks into levels by longest path from a root.
  ///
  /// A task's level is 0 without dependencies, otherwise one more than the
  /// deepest of its dependencies. Keys are sorted within each level.
  pub fn plan(&self) -> ExecutionPlan {
    let mut remaining: HashMap<&str, usize> = self
      .dependencies
      .iter()
      .map(|(k, deps)| (k.as_str(), deps.len()))
      .collect();
    let mut queue: VecDeque<&str> = self.roots().into_iter().collect();
    let mut level_of: BTreeMap<&str, usize> = BTreeMap::new();

    while let Some(key) = queue.pop_front() {
      let level = self
        .dependencies(key)
        .filter_map(|d| level_of.get(d))
        .map(|l| l + 1)
        .max()
        .unwrap_or(0);
      level_of.insert(key, level);

      for dependent in self.dependents(key) {
        if let Some(count) = remaining.get_mut(dependent) {
          *count -= 1;
          if *count == 0 {
            queue.push_back(dependent);
          }
        }
      }
    }

    let depth = level_of.values().max().map_or(0, |l| l + 1);
    let mut levels: Vec<Vec<String>> = vec![Vec::new(); depth];
    for (key, level) in level_of {
      levels[level].push(key.to_string());
    }

    for (index, level) in levels.iter().enumerate() {
      debug!(level = index, tasks = ?level, "planned level");
    }

    ExecutionPlan::new(levels)
  }

  /// Find a cycle using DFS coloring. The returned keys are in dependency
  /// order, starting from the first key of the cycle that was reached.
  ///
  /// The walk keeps its own stack, so chain length is not bounded by the
  /// thread's stack size.
  fn find_cycle(&self) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
      Gray,
      Black,
    }

    let empty = BTreeSet::new();
    let pending = |key: &str| self.dependencies.get(key).unwrap_or(&empty).iter();

    let mut color: HashMap<&str, Color> = HashMap::new();
    for root in self.dependencies.keys() {
      if color.contains_key(root.as_str()) {
        continue;
      }

      // The gray path from `root`, each node with its unvisited dependencies.
      let mut stack = vec![(root.as_str(), pending(root))];
      color.insert(root, Color::Gray);

      while let Some((node, deps)) = stack.last_mut() {
        let node = *node;
        match deps.next() {
          Some(next) => match color.get(next.as_str()) {
            // Back edge
            Some(Color::Gray) => {
              let start = stack.iter().position(|(k, _)| *k == next).unwrap_or(0);
              return Some(stack[start..].iter().map(|(k, _)| k.to_string()).collect());
            }
            Some(Color::Black) => {}
            None => {
              color.insert(next, Color::Gray);
              stack.push((next.as_str(), pending(next)));
            }
          },
          None => {
            color.insert(node, Color::Black);
            stack.pop();
          }
        }
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn edges(table: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    table
      .iter()
      .map(|(k, deps)| (k.to_string(), deps.iter().map(|d| d.to_string()).collect()))
      .collect()
  }

  fn levels(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
    plan
      .levels()
      .iter()
      .map(|l| l.iter().map(|k| k.as_str()).collect())
      .collect()
  }

  #[test]
  fn test_diamond_levels() {
    let graph = DependencyGraph::from_edges(&edges(&[
      ("a", &[]),
      ("b", &["a"]),
      ("c", &["a"]),
      ("d", &["b", "c"]),
    ]))
    .unwrap();

    assert_eq!(graph.roots(), vec!["a"]);
    assert_eq!(graph.dependents("a").collect::<Vec<_>>(), vec!["b", "c"]);
    assert_eq!(
      levels(&graph.plan()),
      vec![vec!["a"], vec!["b", "c"], vec!["d"]]
    );
  }

  #[test]
  fn test_level_is_longest_path() {
    // d depends on a directly and through b -> c.
    let graph = DependencyGraph::from_edges(&edges(&[
      ("a", &[]),
      ("b", &["a"]),
      ("c", &["b"]),
      ("d", &["a", "c"]),
    ]))
    .unwrap();

    let plan = graph.plan();
    assert_eq!(plan.level_of("d"), Some(3));
    assert_eq!(plan.depth(), 4);
  }

  #[test]
  fn test_independent_tasks_share_level_zero() {
    let graph =
      DependencyGraph::from_edges(&edges(&[("z", &[]), ("m", &[]), ("a", &[])])).unwrap();
    assert_eq!(levels(&graph.plan()), vec![vec!["a", "m", "z"]]);
  }

  #[test]
  fn test_empty_graph_has_no_levels() {
    let graph = DependencyGraph::from_edges(&BTreeMap::new()).unwrap();
    assert!(graph.is_empty());
    assert!(graph.plan().is_empty());
  }

  #[test]
  fn test_two_cycle_detected() {
    let err = DependencyGraph::from_edges(&edges(&[("a", &["b"]), ("b", &["a"])])).unwrap_err();
    match err {
      GraphError::CycleDetected { cycle } => {
        let mut sorted = cycle.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b"]);
      }
      other => panic!("expected cycle, got {:?}", other),
    }
  }

  #[test]
  fn test_three_cycle_reported_in_order() {
    let err = DependencyGraph::from_edges(&edges(&[
      ("a", &["b"]),
      ("b", &["c"]),
      ("c", &["a"]),
      ("d", &[]),
    ]))
    .unwrap_err();
    assert_eq!(
      err,
      GraphError::CycleDetected {
        cycle: vec!["a".to_string(), "b".to_string(), "c".to_string()]
      }
    );
  }

  #[test]
  fn test_self_dependency_is_a_cycle() {
    let err = DependencyGraph::from_edges(&edges(&[("a", &["a"])])).unwrap_err();
    assert_eq!(
      err,
      GraphError::CycleDetected {
        cycle: vec!["a".to_string()]
      }
    );
  }

  #[test]
  fn test_long_chain_is_levelled() {
    let length = 50_000;
    let table: BTreeMap<String, Vec<String>> = (0..length)
      .map(|i| {
        let deps = if i == 0 { vec![] } else { vec![format!("t{:05}", i - 1)] };
        (format!("t{:05}", i), deps)
      })
      .collect();

    let graph = DependencyGraph::from_edges(&table).unwrap();
    let plan = graph.plan();
    assert_eq!(plan.depth(), length);
    assert_eq!(plan.level_of("t49999"), Some(length - 1));
  }

  #[test]
  fn test_cycle_at_the_end_of_a_long_chain() {
    let mut table: BTreeMap<String, Vec<String>> = (1..20_000)
      .map(|i| (format!("t{:05}", i), vec![format!("t{:05}", i - 1)]))
      .collect();
    table.insert("t00000".to_string(), vec!["t19999".to_string()]);

    let err = DependencyGraph::from_edges(&table).unwrap_err();
    match err {
      GraphError::CycleDetected { cycle } => assert_eq!(cycle.len(), 20_000),
      other => panic!("expected cycle, got {:?}", other),
    }
  }

  #[test]
  fn test_unknown_dependency_rejected() {
    let err = DependencyGraph::from_edges(&edges(&[("a", &["ghost"])])).unwrap_err();
    assert_eq!(
      err,
      GraphError::UnknownTask {
        task: "a".to_string(),
        dependency: "ghost".to_string()
      }
    );
  }

  #[test]
  fn test_transitive_dependents() {
    let graph = DependencyGraph::from_edges(&edges(&[
      ("net", &[]),
      ("sub", &["net"]),
      ("vm", &["sub"]),
      ("dns", &[]),
    ]))
    .unwrap();

    let downstream: Vec<String> = graph.transitive_dependents("net").into_iter().collect();
    assert_eq!(downstream, vec!["sub", "vm"]);
    assert!(graph.transitive_dependents("dns").is_empty());
  }
}

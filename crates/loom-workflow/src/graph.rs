use std::collections::{HashMap, HashSet};

use loom_fsm::FsmError;

use crate::definition::{WorkflowDefinition, WorkflowNode};

/// A validated workflow: unique node ids, known dependencies, no cycles.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
  definition: WorkflowDefinition,
  /// node_id -> index into `definition.nodes`.
  index: HashMap<String, usize>,
  /// Reverse of `depends_on`: node_id -> nodes that depend on it.
  dependants: HashMap<String, Vec<String>>,
  batches: Vec<Vec<String>>,
}

impl WorkflowGraph {
  /// Validate a definition and compute its execution order.
  pub fn new(definition: WorkflowDefinition) -> Result<Self, FsmError> {
    let batches = compute_order(&definition.nodes)?;

    let index = definition
      .nodes
      .iter()
      .enumerate()
      .map(|(i, node)| (node.node_id.clone(), i))
      .collect();

    let mut dependants: HashMap<String, Vec<String>> = definition
      .nodes
      .iter()
      .map(|node| (node.node_id.clone(), Vec::new()))
      .collect();
    for node in &definition.nodes {
      for dependency in &node.depends_on {
        dependants
          .entry(dependency.clone())
          .or_default()
          .push(node.node_id.clone());
      }
    }

    Ok(Self {
      definition,
      index,
      dependants,
      batches,
    })
  }

  pub fn definition(&self) -> &WorkflowDefinition {
    &self.definition
  }

  pub fn workflow_id(&self) -> &str {
    &self.definition.workflow_id
  }

  pub fn nodes(&self) -> &[WorkflowNode] {
    &self.definition.nodes
  }

  pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
    self
      .index
      .get(node_id)
      .map(|&i| &self.definition.nodes[i])
  }

  /// Batches of node ids in topological order. Nodes within a batch are independent.
  pub fn batches(&self) -> &[Vec<String>] {
    &self.batches
  }

  /// Nodes `node_id` depends on.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .node(node_id)
      .map(|n| n.depends_on.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes that depend on `node_id`.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .dependants
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes with no dependencies.
  pub fn entry_points(&self) -> &[String] {
    self.batches.first().map(|b| b.as_slice()).unwrap_or(&[])
  }

  /// Check if a node waits on more than one upstream node.
  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.upstream(node_id).len() > 1
  }
}

/// Group nodes into dependency batches.
///
/// Batch `n` holds every node whose dependencies all sit in batches `0..n`. Nodes
/// keep their declaration order inside a batch, so the result is deterministic.
pub fn compute_order(nodes: &[WorkflowNode]) -> Result<Vec<Vec<String>>, FsmError> {
  let mut ids = HashSet::with_capacity(nodes.len());
  for node in nodes {
    if !ids.insert(node.node_id.as_str()) {
      return Err(FsmError::DuplicateNode {
        node_id: node.node_id.clone(),
      });
    }
  }

  for node in nodes {
    for dependency in &node.depends_on {
      if !ids.contains(dependency.as_str()) {
        return Err(FsmError::UnknownDependency {
          node_id: node.node_id.clone(),
          dependency: dependency.clone(),
        });
      }
    }
  }

  if let Some(cycle) = find_cycle(nodes) {
    return Err(FsmError::CyclicDependency { cycle });
  }

  let mut placed: HashSet<&str> = HashSet::with_capacity(nodes.len());
  let mut batches = Vec::new();
  while placed.len() < nodes.len() {
    let batch: Vec<&str> = nodes
      .iter()
      .filter(|n| !placed.contains(n.node_id.as_str()))
      .filter(|n| n.depends_on.iter().all(|d| placed.contains(d.as_str())))
      .map(|n| n.node_id.as_str())
      .collect();

    // Unreachable for an acyclic graph; kept so a bug cannot loop forever.
    if batch.is_empty() {
      return Err(FsmError::CyclicDependency {
        cycle: nodes
          .iter()
          .filter(|n| !placed.contains(n.node_id.as_str()))
          .map(|n| n.node_id.clone())
          .collect(),
      });
    }

    placed.extend(batch.iter().copied());
    batches.push(batch.into_iter().map(String::from).collect());
  }

  Ok(batches)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

/// Depth-first search along `depends_on` edges. Returns the first cycle found, with
/// the starting node repeated at the end.
fn find_cycle(nodes: &[WorkflowNode]) -> Option<Vec<String>> {
  let deps: HashMap<&str, &[String]> = nodes
    .iter()
    .map(|n| (n.node_id.as_str(), n.depends_on.as_slice()))
    .collect();
  let mut marks: HashMap<&str, Mark> = nodes
    .iter()
    .map(|n| (n.node_id.as_str(), Mark::Unvisited))
    .collect();

  fn visit<'a>(
    node: &'a str,
    deps: &HashMap<&'a str, &'a [String]>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
  ) -> Option<Vec<String>> {
    marks.insert(node, Mark::InProgress);
    stack.push(node);

    for next in deps.get(node).copied().unwrap_or(&[]) {
      match marks.get(next.as_str()) {
        Some(Mark::InProgress) => {
          let start = stack.iter().position(|n| *n == next.as_str()).unwrap_or(0);
          let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
          cycle.push(next.clone());
          return Some(cycle);
        }
        Some(Mark::Unvisited) => {
          if let Some(cycle) = visit(next.as_str(), deps, marks, stack) {
            return Some(cycle);
          }
        }
        _ => {}
      }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
  }

  let mut stack = Vec::new();
  for node in nodes {
    if marks.get(node.node_id.as_str()) == Some(&Mark::Unvisited) {
      if let Some(cycle) = visit(node.node_id.as_str(), &deps, &mut marks, &mut stack) {
        return Some(cycle);
      }
    }
  }
  None
}

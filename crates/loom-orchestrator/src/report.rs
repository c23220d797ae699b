use std::collections::BTreeMap;

use loom_handler::HandlerOutput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Completed,
  Skipped,
  /// The node's action was stamped under an epoch that is no longer current.
  Superseded,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
  Succeeded,
  Failed { error: String },
  TimedOut { deadline_ms: u64 },
  Stale { current: u64 },
  Cancelled,
}

/// One dispatch of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
  pub node_id: String,
  /// 1-based.
  pub attempt: u32,
  pub action_id: Uuid,
  pub lease_id: Uuid,
  pub epoch: u64,
  #[serde(flatten)]
  pub outcome: AttemptOutcome,
  pub elapsed_ms: u64,
}

/// What happened during a workflow execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowReport {
  pub execution_id: String,
  pub workflow_id: String,
  pub node_status: BTreeMap<String, NodeStatus>,
  pub attempts: Vec<AttemptRecord>,
  /// Index of the last batch in which every node finished.
  pub last_completed_batch: Option<usize>,
  pub skipped: Vec<String>,
  /// Nodes that needed more than one attempt.
  pub retried: Vec<String>,
  pub superseded: Vec<String>,
  pub outputs: BTreeMap<String, HandlerOutput<serde_json::Value>>,
}

impl WorkflowReport {
  pub(crate) fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
    Self {
      execution_id: execution_id.into(),
      workflow_id: workflow_id.into(),
      ..Self::default()
    }
  }

  pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.node_status.get(node_id).copied()
  }

  pub fn attempts_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a AttemptRecord> {
    self.attempts.iter().filter(move |a| a.node_id == node_id)
  }

  pub fn is_completed(&self) -> bool {
    self
      .node_status
      .values()
      .all(|s| matches!(s, NodeStatus::Completed | NodeStatus::Skipped | NodeStatus::Superseded))
  }
}

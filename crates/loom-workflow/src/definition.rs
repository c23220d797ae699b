use loom_message::ActionType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
  #[default]
  Sequential,
  Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureRecoveryStrategy {
  Retry,
  Skip,
  #[default]
  Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  #[default]
  Linear,
  Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub workflow_id: String,
  pub name: String,
  pub nodes: Vec<WorkflowNode>,
  #[serde(default)]
  pub execution_mode: ExecutionMode,
  #[serde(default)]
  pub failure_recovery_strategy: FailureRecoveryStrategy,
  #[serde(default)]
  pub max_retries: u32,
  #[serde(default)]
  pub retry_backoff_ms: u64,
  #[serde(default)]
  pub retry_backoff: RetryBackoff,
  /// Seed for retry jitter. No jitter is applied when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_jitter_seed: Option<u64>,
  /// Deadline applied to every action that has no node-level timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl WorkflowDefinition {
  pub fn new(workflow_id: impl Into<String>, nodes: Vec<WorkflowNode>) -> Self {
    let workflow_id = workflow_id.into();
    Self {
      name: workflow_id.clone(),
      workflow_id,
      nodes,
      execution_mode: ExecutionMode::default(),
      failure_recovery_strategy: FailureRecoveryStrategy::default(),
      max_retries: 0,
      retry_backoff_ms: 0,
      retry_backoff: RetryBackoff::default(),
      retry_jitter_seed: None,
      timeout_ms: None,
    }
  }
}

/// A node of the workflow graph. Each node dispatches one Action when it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
  pub node_id: String,
  /// Node type the resulting Action targets, e.g. `"email_sender"`.
  pub node_type: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub action_type: ActionType,
  /// Payload used when no upstream Intent is bound to the node.
  #[serde(default)]
  pub payload: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl WorkflowNode {
  pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      node_type: node_type.into(),
      depends_on: Vec::new(),
      action_type: ActionType::default(),
      payload: serde_json::Value::Null,
      timeout_ms: None,
    }
  }

  pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.depends_on.extend(dependencies.into_iter().map(Into::into));
    self
  }

  pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
    self.payload = payload;
    self
  }
}

use serde::{Deserialize, Serialize};

/// Configuration for an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
  /// Lease owner this orchestrator dispatches as.
  pub owner: String,
  /// Deadline for actions whose node and workflow set none.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_deadline_ms: Option<u64>,
}

impl OrchestratorConfig {
  pub fn new(owner: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      default_deadline_ms: None,
    }
  }
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self::new("loom-orchestrator")
  }
}

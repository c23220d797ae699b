use std::sync::Arc;

use loom_bus::{EventPublisher, NoopPublisher};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
  Healthy,
  Degraded { reason: String },
  Unhealthy { reason: String },
}

impl HealthStatus {
  pub fn is_healthy(&self) -> bool {
    matches!(self, HealthStatus::Healthy)
  }
}

pub trait HealthCheck: Send + Sync {
  fn check(&self) -> HealthStatus;
}

#[derive(Debug, Clone, Default)]
pub struct AlwaysHealthy;

impl HealthCheck for AlwaysHealthy {
  fn check(&self) -> HealthStatus {
    HealthStatus::Healthy
  }
}

/// Collaborators a node is built with.
#[derive(Clone)]
pub struct NodeCapabilities {
  pub publisher: Arc<dyn EventPublisher>,
  pub health: Arc<dyn HealthCheck>,
}

impl NodeCapabilities {
  pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
    Self {
      publisher,
      health: Arc::new(AlwaysHealthy),
    }
  }

  pub fn with_health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
    self.health = health;
    self
  }
}

impl Default for NodeCapabilities {
  fn default() -> Self {
    Self::new(Arc::new(NoopPublisher))
  }
}

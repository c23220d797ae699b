use serde::{Deserialize, Serialize};

/// Configuration for an [`EnvelopeRunner`](crate::EnvelopeRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
  /// Capacity of the inbound envelope channel.
  pub buffer_size: usize,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self { buffer_size: 100 }
  }
}

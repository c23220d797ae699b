use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Priority;
use crate::payload::{MessageCategory, Payload};

/// A request for a side effect, emitted by pure reduction logic.
///
/// An Intent is not authorized to execute. It becomes an [`Action`](crate::Action)
/// once an orchestrator stamps it with a lease and epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
  intent_id: Uuid,
  intent_type: String,
  target: String,
  #[serde(default)]
  payload: serde_json::Value,
  #[serde(default)]
  priority: Priority,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  lease_id: Option<Uuid>,
}

impl Intent {
  pub fn new(
    intent_id: Uuid,
    intent_type: impl Into<String>,
    target: impl Into<String>,
    payload: serde_json::Value,
    priority: Priority,
  ) -> Self {
    Self {
      intent_id,
      intent_type: intent_type.into(),
      target: target.into(),
      payload,
      priority,
      lease_id: None,
    }
  }

  pub fn with_lease_id(mut self, lease_id: Uuid) -> Self {
    self.lease_id = Some(lease_id);
    self
  }

  pub fn intent_id(&self) -> Uuid {
    self.intent_id
  }

  pub fn intent_type(&self) -> &str {
    &self.intent_type
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn payload(&self) -> &serde_json::Value {
    &self.payload
  }

  pub fn priority(&self) -> Priority {
    self.priority
  }

  pub fn lease_id(&self) -> Option<Uuid> {
    self.lease_id
  }
}

impl Payload for Intent {
  fn payload_type(&self) -> &str {
    &self.intent_type
  }

  fn category(&self) -> MessageCategory {
    MessageCategory::Intent
  }
}

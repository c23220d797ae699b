use serde::{Deserialize, Serialize};

/// Category of a message, derived from the payload it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
  Event,
  Command,
  Intent,
}

/// A payload that can travel inside an [`Envelope`](crate::Envelope).
pub trait Payload {
  /// Routing name of the payload type, e.g. `"order.created"`.
  fn payload_type(&self) -> &str;

  /// The declared kind of the payload.
  fn category(&self) -> MessageCategory;
}

/// A dynamically typed payload.
///
/// Used at the edges of the core where payloads arrive as JSON and are routed by
/// their declared type name rather than a Rust type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynPayload {
  pub payload_type: String,
  pub category: MessageCategory,
  #[serde(default)]
  pub body: serde_json::Value,
}

impl DynPayload {
  pub fn new(
    payload_type: impl Into<String>,
    category: MessageCategory,
    body: serde_json::Value,
  ) -> Self {
    Self {
      payload_type: payload_type.into(),
      category,
      body,
    }
  }

  pub fn event(payload_type: impl Into<String>, body: serde_json::Value) -> Self {
    Self::new(payload_type, MessageCategory::Event, body)
  }

  pub fn command(payload_type: impl Into<String>, body: serde_json::Value) -> Self {
    Self::new(payload_type, MessageCategory::Command, body)
  }

  pub fn intent(payload_type: impl Into<String>, body: serde_json::Value) -> Self {
    Self::new(payload_type, MessageCategory::Intent, body)
  }
}

impl Payload for DynPayload {
  fn payload_type(&self) -> &str {
    &self.payload_type
  }

  fn category(&self) -> MessageCategory {
    self.category
  }
}

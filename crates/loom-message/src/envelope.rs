//! The envelope wrapping every payload dispatched through the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnvelopeError;
use crate::payload::{MessageCategory, Payload};

/// Dispatch priority, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
  pub const MIN: Priority = Priority(1);
  pub const MAX: Priority = Priority(10);
  pub const DEFAULT: Priority = Priority(5);

  pub fn new(value: u8) -> Result<Self, EnvelopeError> {
    if (Self::MIN.0..=Self::MAX.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(EnvelopeError::InvalidPriority { value })
    }
  }

  pub fn get(self) -> u8 {
    self.0
  }
}

impl Default for Priority {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl TryFrom<u8> for Priority {
  type Error = EnvelopeError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Self::new(value)
  }
}

impl From<Priority> for u8 {
  fn from(priority: Priority) -> Self {
    priority.0
  }
}

/// An immutable wrapper carrying a payload plus routing and correlation metadata.
///
/// Metadata is set while the envelope is being built (`with_*` consume and return
/// the envelope); there is no way to change it through a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
  payload: T,
  envelope_id: Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  correlation_id: Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  causation_id: Option<Uuid>,
  #[serde(default)]
  priority: Priority,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  trace_id: Option<Uuid>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  topic: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  operation: Option<String>,
}

impl<T> Envelope<T> {
  /// Wrap a payload in a fresh envelope with default priority.
  pub fn new(payload: T) -> Self {
    Self {
      payload,
      envelope_id: Uuid::new_v4(),
      correlation_id: None,
      causation_id: None,
      priority: Priority::DEFAULT,
      trace_id: None,
      topic: None,
      operation: None,
    }
  }

  /// Wrap `payload` in an envelope caused by `self`.
  ///
  /// The child inherits the correlation id (or uses the parent id when the parent
  /// has none), the trace id and the priority. Its causation id is the parent id.
  pub fn child<U>(&self, payload: U) -> Envelope<U> {
    Envelope {
      payload,
      envelope_id: Uuid::new_v4(),
      correlation_id: Some(self.correlation_id.unwrap_or(self.envelope_id)),
      causation_id: Some(self.envelope_id),
      priority: self.priority,
      trace_id: self.trace_id,
      topic: None,
      operation: None,
    }
  }

  pub fn with_envelope_id(mut self, envelope_id: Uuid) -> Self {
    self.envelope_id = envelope_id;
    self
  }

  pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
    self.correlation_id = Some(correlation_id);
    self
  }

  pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
    self.causation_id = Some(causation_id);
    self
  }

  pub fn with_priority(mut self, priority: Priority) -> Self {
    self.priority = priority;
    self
  }

  pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
    self.trace_id = Some(trace_id);
    self
  }

  /// Topic used by pattern-based routing, e.g. `"orders.eu.created"`.
  pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
    self.topic = Some(topic.into());
    self
  }

  /// Operation name used by operation-based routing.
  pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
    self.operation = Some(operation.into());
    self
  }

  pub fn payload(&self) -> &T {
    &self.payload
  }

  pub fn into_payload(self) -> T {
    self.payload
  }

  pub fn envelope_id(&self) -> Uuid {
    self.envelope_id
  }

  pub fn correlation_id(&self) -> Option<Uuid> {
    self.correlation_id
  }

  pub fn causation_id(&self) -> Option<Uuid> {
    self.causation_id
  }

  pub fn priority(&self) -> Priority {
    self.priority
  }

  pub fn trace_id(&self) -> Option<Uuid> {
    self.trace_id
  }

  pub fn topic(&self) -> Option<&str> {
    self.topic.as_deref()
  }

  pub fn operation(&self) -> Option<&str> {
    self.operation.as_deref()
  }

  /// Convert the payload while keeping every piece of metadata.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
    Envelope {
      payload: f(self.payload),
      envelope_id: self.envelope_id,
      correlation_id: self.correlation_id,
      causation_id: self.causation_id,
      priority: self.priority,
      trace_id: self.trace_id,
      topic: self.topic,
      operation: self.operation,
    }
  }
}

impl<T: Payload> Envelope<T> {
  /// Category inferred from the payload's declared kind.
  pub fn category(&self) -> MessageCategory {
    self.payload.category()
  }

  pub fn payload_type(&self) -> &str {
    self.payload.payload_type()
  }
}

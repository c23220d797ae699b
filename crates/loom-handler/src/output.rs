use std::fmt;

use loom_message::{DynPayload, Envelope, Intent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role a node plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Effect,
  Compute,
  Reducer,
  Orchestrator,
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      NodeKind::Effect => "effect",
      NodeKind::Compute => "compute",
      NodeKind::Reducer => "reducer",
      NodeKind::Orchestrator => "orchestrator",
    };
    f.write_str(name)
  }
}

impl NodeKind {
  fn forbidden(self) -> &'static [OutputField] {
    match self {
      NodeKind::Effect => &[OutputField::Intents, OutputField::Projections, OutputField::Result],
      NodeKind::Compute => &[OutputField::Events, OutputField::Intents, OutputField::Projections],
      NodeKind::Reducer => &[OutputField::Events, OutputField::Intents, OutputField::Result],
      NodeKind::Orchestrator => &[OutputField::Projections, OutputField::Result],
    }
  }
}

/// A populatable field of a [`HandlerOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
  Events,
  Intents,
  Projections,
  Result,
  /// Orchestrators must populate at least one of events and intents.
  EventsOrIntents,
}

impl fmt::Display for OutputField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      OutputField::Events => "events",
      OutputField::Intents => "intents",
      OutputField::Projections => "projections",
      OutputField::Result => "result",
      OutputField::EventsOrIntents => "events or intents",
    };
    f.write_str(name)
  }
}

/// An output that breaks its node kind's contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeViolation {
  #[error("{kind} output must not populate {field}")]
  IllegalField { kind: NodeKind, field: OutputField },

  #[error("{kind} output must populate {field}")]
  MissingRequiredField { kind: NodeKind, field: OutputField },

  #[error("expected {expected} output, got {actual}")]
  UnexpectedKind { expected: NodeKind, actual: NodeKind },
}

/// Where an output came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOrigin {
  pub input_envelope_id: Uuid,
  pub correlation_id: Uuid,
  pub handler_id: String,
}

impl OutputOrigin {
  /// The correlation id falls back to the envelope's own id for root envelopes.
  pub fn from_envelope<P>(envelope: &Envelope<P>, handler_id: impl Into<String>) -> Self {
    Self {
      input_envelope_id: envelope.envelope_id(),
      correlation_id: envelope
        .correlation_id()
        .unwrap_or_else(|| envelope.envelope_id()),
      handler_id: handler_id.into(),
    }
  }
}

/// The populatable fields of an output, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParts<T> {
  #[serde(default)]
  pub events: Vec<DynPayload>,
  #[serde(default)]
  pub intents: Vec<Intent>,
  #[serde(default)]
  pub projections: Vec<serde_json::Value>,
  #[serde(default)]
  pub result: Option<T>,
}

impl<T> Default for OutputParts<T> {
  fn default() -> Self {
    Self {
      events: Vec::new(),
      intents: Vec::new(),
      projections: Vec::new(),
      result: None,
    }
  }
}

impl<T> OutputParts<T> {
  fn is_populated(&self, field: OutputField) -> bool {
    match field {
      OutputField::Events => !self.events.is_empty(),
      OutputField::Intents => !self.intents.is_empty(),
      OutputField::Projections => !self.projections.is_empty(),
      OutputField::Result => self.result.is_some(),
      OutputField::EventsOrIntents => !self.events.is_empty() || !self.intents.is_empty(),
    }
  }
}

/// Check `parts` against the contract of `kind`.
///
/// | kind | required | forbidden |
/// |---|---|---|
/// | effect | events | intents, projections, result |
/// | compute | result | events, intents, projections |
/// | reducer | projections | events, intents, result |
/// | orchestrator | events and/or intents | projections, result |
pub fn validate_output<T>(kind: NodeKind, parts: &OutputParts<T>) -> Result<(), ShapeViolation> {
  if let Some(&field) = kind.forbidden().iter().find(|f| parts.is_populated(**f)) {
    return Err(ShapeViolation::IllegalField { kind, field });
  }

  let required = match kind {
    NodeKind::Effect => OutputField::Events,
    NodeKind::Compute => OutputField::Result,
    NodeKind::Reducer => OutputField::Projections,
    NodeKind::Orchestrator => OutputField::EventsOrIntents,
  };
  if !parts.is_populated(required) {
    return Err(ShapeViolation::MissingRequiredField {
      kind,
      field: required,
    });
  }

  Ok(())
}

/// The result of handling one envelope.
///
/// Every constructor validates the shape, so a value of this type always satisfies
/// its node kind's contract. Deserialization validates too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
  try_from = "RawHandlerOutput<T>",
  bound(deserialize = "T: Deserialize<'de>")
)]
pub struct HandlerOutput<T> {
  input_envelope_id: Uuid,
  correlation_id: Uuid,
  handler_id: String,
  node_kind: NodeKind,
  events: Vec<DynPayload>,
  intents: Vec<Intent>,
  projections: Vec<serde_json::Value>,
  result: Option<T>,
}

impl<T> HandlerOutput<T> {
  pub fn try_new(
    origin: OutputOrigin,
    node_kind: NodeKind,
    parts: OutputParts<T>,
  ) -> Result<Self, ShapeViolation> {
    validate_output(node_kind, &parts)?;
    Ok(Self {
      input_envelope_id: origin.input_envelope_id,
      correlation_id: origin.correlation_id,
      handler_id: origin.handler_id,
      node_kind,
      events: parts.events,
      intents: parts.intents,
      projections: parts.projections,
      result: parts.result,
    })
  }

  pub fn effect(origin: OutputOrigin, events: Vec<DynPayload>) -> Result<Self, ShapeViolation> {
    Self::try_new(origin, NodeKind::Effect, OutputParts {
      events,
      ..OutputParts::default()
    })
  }

  pub fn compute(origin: OutputOrigin, result: T) -> Result<Self, ShapeViolation> {
    Self::try_new(origin, NodeKind::Compute, OutputParts {
      result: Some(result),
      ..OutputParts::default()
    })
  }

  pub fn reducer(
    origin: OutputOrigin,
    projections: Vec<serde_json::Value>,
  ) -> Result<Self, ShapeViolation> {
    Self::try_new(origin, NodeKind::Reducer, OutputParts {
      projections,
      ..OutputParts::default()
    })
  }

  pub fn orchestrator(
    origin: OutputOrigin,
    events: Vec<DynPayload>,
    intents: Vec<Intent>,
  ) -> Result<Self, ShapeViolation> {
    Self::try_new(origin, NodeKind::Orchestrator, OutputParts {
      events,
      intents,
      ..OutputParts::default()
    })
  }

  /// Fail unless this output was built for `expected`.
  pub fn expect_kind(&self, expected: NodeKind) -> Result<(), ShapeViolation> {
    if self.node_kind != expected {
      return Err(ShapeViolation::UnexpectedKind {
        expected,
        actual: self.node_kind,
      });
    }
    Ok(())
  }

  pub fn input_envelope_id(&self) -> Uuid {
    self.input_envelope_id
  }

  pub fn correlation_id(&self) -> Uuid {
    self.correlation_id
  }

  pub fn handler_id(&self) -> &str {
    &self.handler_id
  }

  pub fn node_kind(&self) -> NodeKind {
    self.node_kind
  }

  pub fn events(&self) -> &[DynPayload] {
    &self.events
  }

  pub fn intents(&self) -> &[Intent] {
    &self.intents
  }

  pub fn projections(&self) -> &[serde_json::Value] {
    &self.projections
  }

  pub fn result(&self) -> Option<&T> {
    self.result.as_ref()
  }

  pub fn into_parts(self) -> (OutputOrigin, NodeKind, OutputParts<T>) {
    (
      OutputOrigin {
        input_envelope_id: self.input_envelope_id,
        correlation_id: self.correlation_id,
        handler_id: self.handler_id,
      },
      self.node_kind,
      OutputParts {
        events: self.events,
        intents: self.intents,
        projections: self.projections,
        result: self.result,
      },
    )
  }

  /// Convert the result type. Presence of the result is unchanged, so the shape
  /// stays valid.
  pub fn map_result<U>(self, f: impl FnOnce(T) -> U) -> HandlerOutput<U> {
    HandlerOutput {
      input_envelope_id: self.input_envelope_id,
      correlation_id: self.correlation_id,
      handler_id: self.handler_id,
      node_kind: self.node_kind,
      events: self.events,
      intents: self.intents,
      projections: self.projections,
      result: self.result.map(f),
    }
  }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawHandlerOutput<T> {
  input_envelope_id: Uuid,
  correlation_id: Uuid,
  handler_id: String,
  node_kind: NodeKind,
  #[serde(default)]
  events: Vec<DynPayload>,
  #[serde(default)]
  intents: Vec<Intent>,
  #[serde(default)]
  projections: Vec<serde_json::Value>,
  result: Option<T>,
}

impl<T> TryFrom<RawHandlerOutput<T>> for HandlerOutput<T> {
  type Error = ShapeViolation;

  fn try_from(raw: RawHandlerOutput<T>) -> Result<Self, Self::Error> {
    let origin = OutputOrigin {
      input_envelope_id: raw.input_envelope_id,
      correlation_id: raw.correlation_id,
      handler_id: raw.handler_id,
    };
    Self::try_new(origin, raw.node_kind, OutputParts {
      events: raw.events,
      intents: raw.intents,
      projections: raw.projections,
      result: raw.result,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use loom_message::Priority;
  use serde_json::{Value, json};

  fn origin() -> OutputOrigin {
    OutputOrigin::from_envelope(&Envelope::new(json!({})), "test-handler")
  }

  fn event() -> DynPayload {
    DynPayload::event("email.sent", json!({"to": "a@example.com"}))
  }

  fn intent() -> Intent {
    Intent::new(Uuid::new_v4(), "send_email", "email_sender", json!({}), Priority::default())
  }

  fn parts() -> OutputParts<Value> {
    OutputParts::default()
  }

  #[test]
  fn test_origin_correlation_defaults_to_envelope_id() {
    let envelope = Envelope::new(json!({}));
    let origin = OutputOrigin::from_envelope(&envelope, "h");
    assert_eq!(origin.correlation_id, envelope.envelope_id());

    let correlated = Uuid::new_v4();
    let envelope = Envelope::new(json!({})).with_correlation_id(correlated);
    assert_eq!(OutputOrigin::from_envelope(&envelope, "h").correlation_id, correlated);
  }

  #[test]
  fn test_effect_contract() {
    let output = HandlerOutput::<Value>::effect(origin(), vec![event()]).unwrap();
    assert_eq!(output.node_kind(), NodeKind::Effect);
    assert_eq!(output.events().len(), 1);

    assert_eq!(
      HandlerOutput::<Value>::effect(origin(), vec![]).unwrap_err(),
      ShapeViolation::MissingRequiredField {
        kind: NodeKind::Effect,
        field: OutputField::Events
      }
    );

    let with_intent = OutputParts {
      events: vec![event()],
      intents: vec![intent()],
      ..parts()
    };
    assert_eq!(
      HandlerOutput::try_new(origin(), NodeKind::Effect, with_intent).unwrap_err(),
      ShapeViolation::IllegalField {
        kind: NodeKind::Effect,
        field: OutputField::Intents
      }
    );

    let with_result = OutputParts {
      events: vec![event()],
      result: Some(json!(1)),
      ..parts()
    };
    assert!(matches!(
      HandlerOutput::try_new(origin(), NodeKind::Effect, with_result),
      Err(ShapeViolation::IllegalField { field: OutputField::Result, .. })
    ));
  }

  #[test]
  fn test_compute_contract() {
    let output = HandlerOutput::compute(origin(), json!({"total": 42})).unwrap();
    assert_eq!(output.result(), Some(&json!({"total": 42})));

    assert_eq!(
      HandlerOutput::try_new(origin(), NodeKind::Compute, parts()).unwrap_err(),
      ShapeViolation::MissingRequiredField {
        kind: NodeKind::Compute,
        field: OutputField::Result
      }
    );

    let with_events = OutputParts {
      events: vec![event()],
      result: Some(json!(1)),
      ..parts()
    };
    assert!(matches!(
      HandlerOutput::try_new(origin(), NodeKind::Compute, with_events),
      Err(ShapeViolation::IllegalField { field: OutputField::Events, .. })
    ));

    let with_projections = OutputParts {
      projections: vec![json!({})],
      result: Some(json!(1)),
      ..parts()
    };
    assert!(matches!(
      HandlerOutput::try_new(origin(), NodeKind::Compute, with_projections),
      Err(ShapeViolation::IllegalField { field: OutputField::Projections, .. })
    ));
  }

  #[test]
  fn test_reducer_contract() {
    let output = HandlerOutput::<Value>::reducer(origin(), vec![json!({"state": "paid"})]).unwrap();
    assert_eq!(output.projections().len(), 1);

    assert!(matches!(
      HandlerOutput::<Value>::reducer(origin(), vec![]),
      Err(ShapeViolation::MissingRequiredField { field: OutputField::Projections, .. })
    ));

    let with_intents = OutputParts {
      projections: vec![json!({})],
      intents: vec![intent()],
      ..parts()
    };
    assert!(matches!(
      HandlerOutput::try_new(origin(), NodeKind::Reducer, with_intents),
      Err(ShapeViolation::IllegalField { field: OutputField::Intents, .. })
    ));
  }

  #[test]
  fn test_orchestrator_contract() {
    assert!(HandlerOutput::<Value>::orchestrator(origin(), vec![event()], vec![]).is_ok());
    assert!(HandlerOutput::<Value>::orchestrator(origin(), vec![], vec![intent()]).is_ok());
    assert!(HandlerOutput::<Value>::orchestrator(origin(), vec![event()], vec![intent()]).is_ok());

    assert_eq!(
      HandlerOutput::<Value>::orchestrator(origin(), vec![], vec![]).unwrap_err(),
      ShapeViolation::MissingRequiredField {
        kind: NodeKind::Orchestrator,
        field: OutputField::EventsOrIntents
      }
    );

    let with_projection = OutputParts {
      events: vec![event()],
      projections: vec![json!({})],
      ..parts()
    };
    assert!(matches!(
      HandlerOutput::try_new(origin(), NodeKind::Orchestrator, with_projection),
      Err(ShapeViolation::IllegalField { field: OutputField::Projections, .. })
    ));
  }

  #[test]
  fn test_expect_kind() {
    let output = HandlerOutput::compute(origin(), json!(1)).unwrap();
    assert!(output.expect_kind(NodeKind::Compute).is_ok());
    assert_eq!(
      output.expect_kind(NodeKind::Effect).unwrap_err(),
      ShapeViolation::UnexpectedKind {
        expected: NodeKind::Effect,
        actual: NodeKind::Compute
      }
    );
  }

  #[test]
  fn test_deserialize_validates_shape() {
    let id = Uuid::new_v4();
    let valid = json!({
      "input_envelope_id": id,
      "correlation_id": id,
      "handler_id": "h",
      "node_kind": "compute",
      "result": {"ok": true}
    });
    let output: HandlerOutput<Value> = serde_json::from_value(valid).unwrap();
    assert_eq!(output.handler_id(), "h");

    let invalid = json!({
      "input_envelope_id": id,
      "correlation_id": id,
      "handler_id": "h",
      "node_kind": "reducer",
      "result": {"ok": true}
    });
    let err = serde_json::from_value::<HandlerOutput<Value>>(invalid).unwrap_err();
    assert!(err.to_string().contains("reducer output must not populate result"));
  }

  #[test]
  fn test_deserialize_result_without_default() {
    #[derive(Debug, PartialEq, Deserialize)]
    struct Quote {
      total: u32,
    }

    let id = Uuid::new_v4();
    let value = json!({
      "input_envelope_id": id,
      "correlation_id": id,
      "handler_id": "pricing",
      "node_kind": "compute",
      "result": {"total": 42}
    });
    let output: HandlerOutput<Quote> = serde_json::from_value(value).unwrap();
    assert_eq!(output.result(), Some(&Quote { total: 42 }));

    let missing = json!({
      "input_envelope_id": id,
      "correlation_id": id,
      "handler_id": "pricing",
      "node_kind": "compute"
    });
    let err = serde_json::from_value::<HandlerOutput<Quote>>(missing).unwrap_err();
    assert!(err.to_string().contains("result"));
  }

  #[test]
  fn test_map_result_keeps_origin() {
    let output = HandlerOutput::compute(origin(), 21).unwrap();
    let doubled = output.map_result(|n| n * 2);
    assert_eq!(doubled.result(), Some(&42));
    assert_eq!(doubled.handler_id(), "test-handler");
  }
}

use std::sync::Arc;

use async_trait::async_trait;
use loom_bus::{ActionPhase, BusMessage, EventPublisher};
use loom_fsm::{FsmError, FsmEvent, StateMachine, TransitionOutcome};
use loom_handler::{Handler, HandlerError, HandlerOutput, NodeKind, OutputOrigin};
use loom_message::{DynPayload, Envelope};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capabilities::{HealthStatus, NodeCapabilities};

/// A reducer backed by a state machine.
///
/// Each envelope is an FSM event: its payload type is the trigger and its body the
/// event payload. The node keeps the current state; the transition itself is pure.
/// Exit actions, intents and entry actions are published in that order, and the
/// new state is returned as a projection.
///
/// Events are applied one at a time. The new state is committed only once every
/// message of the transition was published, so an event that failed to publish can
/// be redelivered; subscribers may then see some of its messages twice.
pub struct ReducerNode {
  handler_id: String,
  machine: Arc<StateMachine>,
  state: Mutex<String>,
  capabilities: NodeCapabilities,
}

impl ReducerNode {
  pub fn new(
    handler_id: impl Into<String>,
    machine: Arc<StateMachine>,
    capabilities: NodeCapabilities,
  ) -> Self {
    let state = machine.initial_state().to_string();
    Self {
      handler_id: handler_id.into(),
      machine,
      state: Mutex::new(state),
      capabilities,
    }
  }

  pub async fn current_state(&self) -> String {
    self.state.lock().await.clone()
  }

  pub fn health(&self) -> HealthStatus {
    self.capabilities.health.check()
  }


  async fn publish_outcome(
    &self,
    envelope: &Envelope<DynPayload>,
    outcome: &TransitionOutcome,
  ) -> Result<(), HandlerError> {
    let publisher: &dyn EventPublisher = self.capabilities.publisher.as_ref();
    let correlation_id = envelope
      .correlation_id()
      .unwrap_or_else(|| envelope.envelope_id());

    let state_actions = outcome
      .exit_actions
      .iter()
      .map(|a| (ActionPhase::Exit, &outcome.previous_state, a));
    let entry_actions = outcome
      .entry_actions
      .iter()
      .map(|a| (ActionPhase::Entry, &outcome.next_state, a));

    for (phase, state, action) in state_actions {
      publish(publisher, BusMessage::StateAction {
        machine: self.machine.name().to_string(),
        state: state.clone(),
        phase,
        action: action.clone(),
        correlation_id: Some(correlation_id),
      })
      .await?;
    }

    for intent in &outcome.intents {
      let child = envelope
        .child(intent.clone())
        .with_priority(intent.priority());
      publish(publisher, child.into()).await?;
    }

    for (phase, state, action) in entry_actions {
      publish(publisher, BusMessage::StateAction {
        machine: self.machine.name().to_string(),
        state: state.clone(),
        phase,
        action: action.clone(),
        correlation_id: Some(correlation_id),
      })
      .await?;
    }
    Ok(())
  }
}

async fn publish(publisher: &dyn EventPublisher, message: BusMessage) -> Result<(), HandlerError> {
  publisher
    .publish(message)
    .await
    .map_err(|e| HandlerError::failed(format!("failed to publish: {}", e)))
}

#[async_trait]
impl Handler for ReducerNode {
  fn handler_id(&self) -> &str {
    &self.handler_id
  }

  fn node_kind(&self) -> NodeKind {
    NodeKind::Reducer
  }

  async fn handle(
    &self,
    envelope: &Envelope<DynPayload>,
  ) -> Result<HandlerOutput<serde_json::Value>, HandlerError> {
    let payload = envelope.payload();
    let event = FsmEvent::new(payload.payload_type.clone())
      .with_payload(payload.body.clone())
      .with_event_id(envelope.envelope_id());

    let mut state = self.state.lock().await;
    let outcome = self.machine.transition(&state, &event).map_err(|e| match e {
      FsmError::NoMatchingTransition { .. } | FsmError::UnknownState { .. } => {
        HandlerError::invalid_input(e.to_string())
      }
      other => HandlerError::failed(other.to_string()),
    })?;

    info!(
      handler_id = %self.handler_id,
      machine = %self.machine.name(),
      from = %outcome.previous_state,
      to = %outcome.next_state,
      intents = outcome.intents.len(),
      "state_transition"
    );
    if let Err(e) = self.publish_outcome(envelope, &outcome).await {
      warn!(
        handler_id = %self.handler_id,
        state = %outcome.previous_state,
        error = %e,
        "transition_not_committed"
      );
      return Err(e);
    }
    state.clone_from(&outcome.next_state);
    drop(state);
    debug!(handler_id = %self.handler_id, "transition_committed");

    let projection = json!({
      "machine": self.machine.name(),
      "previous_state": outcome.previous_state,
      "state": outcome.next_state,
      "is_terminal": outcome.is_terminal,
      "intent_ids": outcome.intents.iter().map(|i| i.intent_id()).collect::<Vec<_>>(),
    });
    let origin = OutputOrigin::from_envelope(envelope, &self.handler_id);
    Ok(HandlerOutput::reducer(origin, vec![projection])?)
  }
}

use loom_message::{DynPayload, Envelope, Intent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a state action runs on leaving or entering a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
  Exit,
  Entry,
}

/// Anything the core hands to the bus binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
  /// An event produced by an effect or orchestrator.
  Event { envelope: Envelope<DynPayload> },

  /// An intent emitted by a reducer transition.
  Intent { envelope: Envelope<Intent> },

  /// A named entry or exit action for the binding to execute.
  StateAction {
    machine: String,
    state: String,
    phase: ActionPhase,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
  },

  Execution(ExecutionEvent),
}

/// Workflow lifecycle, emitted while an orchestrator runs a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  WorkflowStarted {
    execution_id: String,
    workflow_id: String,
  },

  /// A batch of independent nodes is about to run.
  BatchStarted {
    execution_id: String,
    batch: usize,
    node_ids: Vec<String>,
  },

  ActionDispatched {
    execution_id: String,
    node_id: String,
    action_id: Uuid,
    lease_id: Uuid,
    epoch: u64,
    attempt: u32,
  },

  NodeCompleted {
    execution_id: String,
    node_id: String,
    events: usize,
  },

  NodeRetryScheduled {
    execution_id: String,
    node_id: String,
    attempt: u32,
    delay_ms: u64,
    error: String,
  },

  NodeSkipped {
    execution_id: String,
    node_id: String,
    error: String,
  },

  /// The node's action was stamped under an epoch that is no longer current.
  NodeSuperseded {
    execution_id: String,
    node_id: String,
    action_id: Uuid,
    stamped: u64,
    current: u64,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
  },

  WorkflowCompleted { execution_id: String },

  WorkflowAborted {
    execution_id: String,
    node_id: String,
    error: String,
  },

  WorkflowCancelled { execution_id: String },
}

impl ExecutionEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      ExecutionEvent::WorkflowStarted { execution_id, .. }
      | ExecutionEvent::BatchStarted { execution_id, .. }
      | ExecutionEvent::ActionDispatched { execution_id, .. }
      | ExecutionEvent::NodeCompleted { execution_id, .. }
      | ExecutionEvent::NodeRetryScheduled { execution_id, .. }
      | ExecutionEvent::NodeSkipped { execution_id, .. }
      | ExecutionEvent::NodeSuperseded { execution_id, .. }
      | ExecutionEvent::NodeFailed { execution_id, .. }
      | ExecutionEvent::WorkflowCompleted { execution_id }
      | ExecutionEvent::WorkflowAborted { execution_id, .. }
      | ExecutionEvent::WorkflowCancelled { execution_id } => execution_id,
    }
  }
}

impl From<ExecutionEvent> for BusMessage {
  fn from(event: ExecutionEvent) -> Self {
    BusMessage::Execution(event)
  }
}

impl From<Envelope<DynPayload>> for BusMessage {
  fn from(envelope: Envelope<DynPayload>) -> Self {
    BusMessage::Event { envelope }
  }
}

impl From<Envelope<Intent>> for BusMessage {
  fn from(envelope: Envelope<Intent>) -> Self {
    BusMessage::Intent { envelope }
  }
}

use loom_bus::PublishError;
use loom_fsm::FsmError;
use loom_handler::{HandlerError, ShapeViolation};
use loom_lease::LeaseError;
use uuid::Uuid;

use crate::report::WorkflowReport;

/// Errors from dispatching and executing a single Action.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  /// The lease moved on after the Action was stamped. The Action never ran.
  #[error("action '{action_id}' is stale: stamped at epoch {stamped}, lease is at {current}")]
  StaleEpoch {
    action_id: Uuid,
    stamped: u64,
    current: u64,
  },

  #[error("effect handler failed for action '{action_id}'")]
  HandlerFailure {
    action_id: Uuid,
    #[source]
    source: HandlerError,
  },

  #[error("action '{action_id}' timed out after {deadline_ms}ms")]
  Timeout { action_id: Uuid, deadline_ms: u64 },

  #[error("lease is held by '{holder}', not '{owner}'")]
  LeaseNotHeld { owner: String, holder: String },

  /// The Intent or Action is bound to a different lease.
  #[error("expected lease '{expected}', found '{actual}'")]
  LeaseMismatch { expected: Uuid, actual: Uuid },

  #[error(transparent)]
  Shape(#[from] ShapeViolation),

  #[error("failed to publish effect output")]
  Publish(#[from] PublishError),

  #[error("dispatch cancelled")]
  Cancelled,
}

impl DispatchError {
  /// Failures the workflow's recovery strategy decides about.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      DispatchError::HandlerFailure { .. } | DispatchError::Timeout { .. }
    )
  }
}

/// Errors from running a whole workflow.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error("invalid workflow")]
  InvalidWorkflow(#[from] FsmError),

  #[error("no effect handler for node '{node_id}' (node type '{node_type}')")]
  MissingHandler { node_id: String, node_type: String },

  /// Execution halted at `node_id`. The report holds the last completed batch and
  /// the nodes skipped or retried before the failure.
  #[error("workflow aborted at node '{node_id}'")]
  Aborted {
    node_id: String,
    #[source]
    source: DispatchError,
    report: Box<WorkflowReport>,
  },

  #[error("lease refresh failed")]
  Lease(#[from] LeaseError),

  #[error("task for node '{node_id}' did not complete: {message}")]
  TaskJoin { node_id: String, message: String },

  #[error("workflow cancelled")]
  Cancelled,
}

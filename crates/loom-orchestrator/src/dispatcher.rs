use std::time::Duration;

use loom_handler::{HandlerError, HandlerOutput, NodeKind};
use loom_lease::LeaseHandle;
use loom_message::{Action, ActionType, Intent};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::effect::EffectHandler;
use crate::error::DispatchError;

/// Turns Intents into lease-stamped Actions and runs them.
#[derive(Debug, Clone)]
pub struct LeaseDispatcher {
  owner: String,
}

impl LeaseDispatcher {
  pub fn new(owner: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
    }
  }

  pub fn owner(&self) -> &str {
    &self.owner
  }

  /// Stamp an Effect Action for the intent's target with the lease's current epoch.
  pub fn dispatch(&self, intent: &Intent, lease: &LeaseHandle) -> Result<Action, DispatchError> {
    self.dispatch_with(intent, lease, ActionType::Effect, intent.target(), Vec::new())
  }

  pub fn dispatch_with(
    &self,
    intent: &Intent,
    lease: &LeaseHandle,
    action_type: ActionType,
    target_node_type: &str,
    dependencies: Vec<Uuid>,
  ) -> Result<Action, DispatchError> {
    let snapshot = lease.snapshot();
    if snapshot.owner != self.owner {
      return Err(DispatchError::LeaseNotHeld {
        owner: self.owner.clone(),
        holder: snapshot.owner,
      });
    }
    if let Some(bound) = intent.lease_id() {
      if bound != snapshot.lease_id {
        return Err(DispatchError::LeaseMismatch {
          expected: bound,
          actual: snapshot.lease_id,
        });
      }
    }

    let action = Action::from_intent(
      intent,
      action_type,
      target_node_type,
      dependencies,
      snapshot.stamp(),
    );
    debug!(
      intent_id = %intent.intent_id(),
      action_id = %action.action_id(),
      lease_id = %action.lease_id(),
      epoch = action.epoch(),
      "action_stamped"
    );
    Ok(action)
  }

  /// Fail with `StaleEpoch` unless the action's stamp is still current.
  pub fn check_current(&self, action: &Action, lease: &LeaseHandle) -> Result<(), DispatchError> {
    if action.lease_id() != lease.lease_id() {
      return Err(DispatchError::LeaseMismatch {
        expected: lease.lease_id(),
        actual: action.lease_id(),
      });
    }

    let current = lease.current_epoch();
    if current != action.epoch() {
      return Err(DispatchError::StaleEpoch {
        action_id: action.action_id(),
        stamped: action.epoch(),
        current,
      });
    }
    Ok(())
  }

  /// Run an action through its effect handler.
  ///
  /// The epoch is re-read immediately before the handler is called; a stale action
  /// is dropped without calling it. A deadline bounds the handler call only.
  #[instrument(
    name = "action_execute",
    skip(self, action, lease, handler),
    fields(action_id = %action.action_id(), epoch = action.epoch())
  )]
  pub async fn execute(
    &self,
    action: &Action,
    lease: &LeaseHandle,
    handler: &dyn EffectHandler,
    deadline: Option<Duration>,
  ) -> Result<HandlerOutput<serde_json::Value>, DispatchError> {
    if let Err(e) = self.check_current(action, lease) {
      warn!(action_id = %action.action_id(), error = %e, "action_stale");
      return Err(e);
    }

    let call = handler.execute(action);
    let result = match deadline {
      Some(deadline) => tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| DispatchError::Timeout {
          action_id: action.action_id(),
          deadline_ms: deadline.as_millis() as u64,
        })?,
      None => call.await,
    };

    let output = result.map_err(|e| match e {
      HandlerError::Shape(violation) => DispatchError::Shape(violation),
      source => DispatchError::HandlerFailure {
        action_id: action.action_id(),
        source,
      },
    })?;
    output.expect_kind(NodeKind::Effect)?;
    Ok(output)
  }
}

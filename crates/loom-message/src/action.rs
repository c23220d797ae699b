use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Priority;
use crate::intent::Intent;
use crate::payload::{MessageCategory, Payload};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
  #[default]
  Effect,
  Compute,
  Reduce,
  Orchestrate,
  Custom,
}

/// The lease identity and epoch an Action was authorized under.
///
/// Both halves are required; there is no way to build an [`Action`] without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseStamp {
  pub lease_id: Uuid,
  pub epoch: u64,
}

/// An authorized, lease-stamped unit of work derived from an [`Intent`].
///
/// Actions are never mutated after creation. A retry creates a new Action from the
/// same Intent with a fresh id and a fresh stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  action_id: Uuid,
  action_type: ActionType,
  target_node_type: String,
  #[serde(default)]
  payload: serde_json::Value,
  #[serde(default)]
  dependencies: Vec<Uuid>,
  lease_id: Uuid,
  epoch: u64,
  intent_id: Uuid,
  #[serde(default)]
  priority: Priority,
}

impl Action {
  pub fn from_intent(
    intent: &Intent,
    action_type: ActionType,
    target_node_type: impl Into<String>,
    dependencies: Vec<Uuid>,
    stamp: LeaseStamp,
  ) -> Self {
    Self {
      action_id: Uuid::new_v4(),
      action_type,
      target_node_type: target_node_type.into(),
      payload: intent.payload().clone(),
      dependencies,
      lease_id: stamp.lease_id,
      epoch: stamp.epoch,
      intent_id: intent.intent_id(),
      priority: intent.priority(),
    }
  }

  pub fn action_id(&self) -> Uuid {
    self.action_id
  }

  pub fn action_type(&self) -> ActionType {
    self.action_type
  }

  pub fn target_node_type(&self) -> &str {
    &self.target_node_type
  }

  pub fn payload(&self) -> &serde_json::Value {
    &self.payload
  }

  pub fn dependencies(&self) -> &[Uuid] {
    &self.dependencies
  }

  pub fn lease_id(&self) -> Uuid {
    self.lease_id
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn stamp(&self) -> LeaseStamp {
    LeaseStamp {
      lease_id: self.lease_id,
      epoch: self.epoch,
    }
  }

  /// Id of the Intent this Action was derived from.
  pub fn intent_id(&self) -> Uuid {
    self.intent_id
  }

  pub fn priority(&self) -> Priority {
    self.priority
  }
}

impl Payload for Action {
  fn payload_type(&self) -> &str {
    &self.target_node_type
  }

  fn category(&self) -> MessageCategory {
    MessageCategory::Command
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_action_copies_intent_content() {
    let intent = Intent::new(
      Uuid::new_v4(),
      "send_email",
      "mailer",
      json!({ "to": "a@b.c" }),
      Priority::new(7).unwrap(),
    );
    let stamp = LeaseStamp {
      lease_id: Uuid::new_v4(),
      epoch: 3,
    };

    let action = Action::from_intent(&intent, ActionType::Effect, "mailer", vec![], stamp);

    assert_eq!(action.intent_id(), intent.intent_id());
    assert_eq!(action.payload(), intent.payload());
    assert_eq!(action.stamp(), stamp);
    assert_eq!(action.priority().get(), 7);
    assert_eq!(action.category(), MessageCategory::Command);
  }

  #[test]
  fn test_retry_gets_fresh_identity() {
    let intent = Intent::new(Uuid::new_v4(), "t", "n", json!(null), Priority::DEFAULT);
    let stamp = LeaseStamp {
      lease_id: Uuid::new_v4(),
      epoch: 0,
    };
    let first = Action::from_intent(&intent, ActionType::Effect, "n", vec![], stamp);
    let second = Action::from_intent(&intent, ActionType::Effect, "n", vec![], stamp);

    assert_ne!(first.action_id(), second.action_id());
    assert_eq!(first.intent_id(), second.intent_id());
  }

  #[test]
  fn test_deserialize_requires_lease() {
    let raw = json!({
      "action_id": Uuid::new_v4(),
      "action_type": "effect",
      "target_node_type": "mailer",
      "epoch": 1,
      "intent_id": Uuid::new_v4()
    });
    let parsed: Result<Action, _> = serde_json::from_value(raw);
    assert!(parsed.is_err());
  }
}

use std::collections::BTreeMap;

use loom_message::Priority;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::template::SchemaType;

/// `from_state` value matching any current state.
pub const WILDCARD: &str = "*";

/// A state machine as supplied by the contract loader.
///
/// The definition is only a description. [`StateMachine::new`](crate::StateMachine::new)
/// checks its semantic invariants and produces the executable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmDefinition {
  pub name: String,
  pub initial_state: String,
  pub states: Vec<StateDef>,
  #[serde(default)]
  pub transitions: Vec<TransitionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
  pub name: String,
  #[serde(default)]
  pub is_terminal: bool,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub entry_actions: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub exit_actions: Vec<String>,
}

impl StateDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      is_terminal: false,
      entry_actions: Vec::new(),
      exit_actions: Vec::new(),
    }
  }

  pub fn terminal(name: impl Into<String>) -> Self {
    Self {
      is_terminal: true,
      ..Self::new(name)
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
  pub from_state: String,
  pub to_state: String,
  pub trigger: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub conditions: Vec<Condition>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub actions: Vec<ActionTemplate>,
}

impl TransitionDef {
  pub fn new(
    from_state: impl Into<String>,
    to_state: impl Into<String>,
    trigger: impl Into<String>,
  ) -> Self {
    Self {
      from_state: from_state.into(),
      to_state: to_state.into(),
      trigger: trigger.into(),
      conditions: Vec::new(),
      actions: Vec::new(),
    }
  }

  pub fn when(mut self, condition: Condition) -> Self {
    self.conditions.push(condition);
    self
  }

  pub fn emit(mut self, action: ActionTemplate) -> Self {
    self.actions.push(action);
    self
  }

  pub fn is_wildcard(&self) -> bool {
    self.from_state == WILDCARD
  }
}

/// Describes an Intent emitted when a transition is taken.
///
/// Payload values are minijinja templates rendered against the event payload, then
/// coerced according to `payload_schema` (string when a field is not listed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
  pub intent_type: String,
  pub target: String,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub payload: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub payload_schema: BTreeMap<String, SchemaType>,
}

impl ActionTemplate {
  pub fn new(intent_type: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      intent_type: intent_type.into(),
      target: target.into(),
      priority: Priority::DEFAULT,
      payload: BTreeMap::new(),
      payload_schema: BTreeMap::new(),
    }
  }

  pub fn field(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
    self.payload.insert(name.into(), template.into());
    self
  }

  pub fn typed_field(
    mut self,
    name: impl Into<String>,
    template: impl Into<String>,
    schema_type: SchemaType,
  ) -> Self {
    let name = name.into();
    self.payload_schema.insert(name.clone(), schema_type);
    self.payload.insert(name, template.into());
    self
  }
}

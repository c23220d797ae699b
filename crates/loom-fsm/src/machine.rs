//! Compiled state machines and the transition function.

use std::collections::HashMap;

use loom_message::Intent;
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::condition::{Condition, check_expression, evaluate_condition};
use crate::definition::{ActionTemplate, FsmDefinition, StateDef, TransitionDef, WILDCARD};
use crate::error::FsmError;
use crate::template::{coerce_payload, render_payload};

/// Namespace for deterministic intent ids.
const INTENT_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_6f6d_2d66_736d_2d69_6e74_656e_7473);

/// An event fed to [`StateMachine::transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmEvent {
  pub trigger: String,
  #[serde(default)]
  pub payload: serde_json::Value,
  /// Identity of the event, when the caller has one. Used to derive intent ids.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_id: Option<Uuid>,
}

impl FsmEvent {
  pub fn new(trigger: impl Into<String>) -> Self {
    Self {
      trigger: trigger.into(),
      payload: serde_json::Value::Null,
      event_id: None,
    }
  }

  pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
    self.payload = payload;
    self
  }

  pub fn with_event_id(mut self, event_id: Uuid) -> Self {
    self.event_id = Some(event_id);
    self
  }
}

/// Everything a transition produced.
///
/// Entry and exit actions are not executed here; they are handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
  pub previous_state: String,
  pub next_state: String,
  pub is_terminal: bool,
  pub intents: Vec<Intent>,
  pub exit_actions: Vec<String>,
  pub entry_actions: Vec<String>,
}

/// A validated, executable state machine.
///
/// Transitions are stored with exact `from_state` matches first and wildcard
/// transitions last, each group keeping its declaration order.
#[derive(Debug, Clone)]
pub struct StateMachine {
  name: String,
  initial_state: String,
  states: HashMap<String, StateDef>,
  transitions: Vec<TransitionDef>,
}

impl StateMachine {
  /// Validate a definition and build the executable machine.
  ///
  /// Checks:
  /// - state names are unique and the initial state is declared
  /// - at least one state is terminal
  /// - every transition endpoint names a declared state (`*` allowed as source)
  /// - no exact transition leaves a terminal state
  /// - every condition expression compiles
  pub fn new(def: FsmDefinition) -> Result<Self, FsmError> {
    let mut states = HashMap::with_capacity(def.states.len());
    for state in def.states {
      if state.name == WILDCARD {
        return Err(FsmError::invalid_definition(
          "'*' is reserved and cannot name a state",
        ));
      }
      if states.contains_key(&state.name) {
        return Err(FsmError::invalid_definition(format!(
          "duplicate state '{}'",
          state.name
        )));
      }
      states.insert(state.name.clone(), state);
    }

    if !states.contains_key(&def.initial_state) {
      return Err(FsmError::invalid_definition(format!(
        "initial state '{}' is not declared",
        def.initial_state
      )));
    }

    if !states.values().any(|s| s.is_terminal) {
      return Err(FsmError::invalid_definition(
        "at least one state must be terminal",
      ));
    }

    for (index, t) in def.transitions.iter().enumerate() {
      if !t.is_wildcard() {
        let from = states
          .get(&t.from_state)
          .ok_or_else(|| FsmError::invalid_definition(format!(
            "transition {} leaves undeclared state '{}'",
            index, t.from_state
          )))?;
        if from.is_terminal {
          return Err(FsmError::invalid_definition(format!(
            "transition {} leaves terminal state '{}'; only wildcard transitions may",
            index, t.from_state
          )));
        }
      }
      if !states.contains_key(&t.to_state) {
        return Err(FsmError::invalid_definition(format!(
          "transition {} enters undeclared state '{}'",
          index, t.to_state
        )));
      }
      for condition in &t.conditions {
        if let Condition::Expression { expression } = condition {
          check_expression(expression).map_err(|message| {
            FsmError::invalid_definition(format!(
              "transition {} has an invalid condition '{}': {}",
              index, expression, message
            ))
          })?;
        }
      }
    }

    let (exact, wildcard): (Vec<_>, Vec<_>) =
      def.transitions.into_iter().partition(|t| !t.is_wildcard());
    let transitions = exact.into_iter().chain(wildcard).collect();

    Ok(Self {
      name: def.name,
      initial_state: def.initial_state,
      states,
      transitions,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn initial_state(&self) -> &str {
    &self.initial_state
  }

  pub fn state(&self, name: &str) -> Option<&StateDef> {
    self.states.get(name)
  }

  pub fn is_terminal(&self, name: &str) -> bool {
    self.states.get(name).is_some_and(|s| s.is_terminal)
  }

  /// Transitions in evaluation order.
  pub fn transitions(&self) -> &[TransitionDef] {
    &self.transitions
  }

  /// Compute the next state and the intents emitted by the matching transition.
  ///
  /// The first transition (in evaluation order) whose trigger matches and whose
  /// conditions all hold is taken. From a terminal state only wildcard transitions
  /// are considered.
  pub fn transition(
    &self,
    current_state: &str,
    event: &FsmEvent,
  ) -> Result<TransitionOutcome, FsmError> {
    let current = self
      .states
      .get(current_state)
      .ok_or_else(|| FsmError::UnknownState {
        state: current_state.to_string(),
      })?;

    for (index, t) in self.transitions.iter().enumerate() {
      let source_matches =
        t.is_wildcard() || (!current.is_terminal && t.from_state == current_state);
      if !source_matches || t.trigger != event.trigger {
        continue;
      }
      if !self.conditions_hold(index, t, &event.payload)? {
        trace!(
          fsm = %self.name,
          state = %current_state,
          trigger = %event.trigger,
          transition = index,
          "conditions not met"
        );
        continue;
      }
      return self.take(index, t, current, event);
    }

    Err(FsmError::NoMatchingTransition {
      state: current_state.to_string(),
      trigger: event.trigger.clone(),
    })
  }

  fn conditions_hold(
    &self,
    index: usize,
    t: &TransitionDef,
    payload: &serde_json::Value,
  ) -> Result<bool, FsmError> {
    for condition in &t.conditions {
      let holds = evaluate_condition(condition, payload)
        .map_err(|message| FsmError::ConditionEvaluation {
          transition: index,
          message,
        })?;
      if !holds {
        return Ok(false);
      }
    }
    Ok(true)
  }

  fn take(
    &self,
    index: usize,
    t: &TransitionDef,
    current: &StateDef,
    event: &FsmEvent,
  ) -> Result<TransitionOutcome, FsmError> {
    let next = self
      .states
      .get(&t.to_state)
      .ok_or_else(|| FsmError::UnknownState {
        state: t.to_state.clone(),
      })?;

    let intents = t
      .actions
      .iter()
      .enumerate()
      .map(|(action_index, action)| self.build_intent(index, action_index, action, current, event))
      .collect::<Result<Vec<_>, _>>()?;

    let changed = next.name != current.name;
    Ok(TransitionOutcome {
      previous_state: current.name.clone(),
      next_state: next.name.clone(),
      is_terminal: next.is_terminal,
      intents,
      exit_actions: if changed {
        current.exit_actions.clone()
      } else {
        Vec::new()
      },
      entry_actions: if changed {
        next.entry_actions.clone()
      } else {
        Vec::new()
      },
    })
  }

  fn build_intent(
    &self,
    transition_index: usize,
    action_index: usize,
    action: &ActionTemplate,
    current: &StateDef,
    event: &FsmEvent,
  ) -> Result<Intent, FsmError> {
    let rendered = render_payload(&action.payload, &event.payload)?;
    let payload = coerce_payload(&rendered, &action.payload_schema)?;

    // serde_json maps are ordered, so the serialized payload is stable.
    let event_key = match event.event_id {
      Some(id) => id.to_string(),
      None => event.payload.to_string(),
    };
    let name = format!(
      "{}|{}|{}|{}|{}|{}|{}",
      self.name,
      current.name,
      transition_index,
      event.trigger,
      action_index,
      action.intent_type,
      event_key
    );
    let intent_id = Uuid::new_v5(&INTENT_NAMESPACE, name.as_bytes());

    Ok(Intent::new(
      intent_id,
      action.intent_type.clone(),
      action.target.clone(),
      payload,
      action.priority,
    ))
  }
}

/// Free-function form of [`StateMachine::transition`].
pub fn transition(
  machine: &StateMachine,
  current_state: &str,
  event: &FsmEvent,
) -> Result<TransitionOutcome, FsmError> {
  machine.transition(current_state, event)
}

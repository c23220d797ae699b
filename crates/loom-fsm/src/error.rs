use thiserror::Error;

/// Errors produced by state machine evaluation and by dependency-graph validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError {
  /// No transition matched the trigger and conditions from the current state.
  /// This is an expected outcome for malformed event streams, not a crash.
  #[error("no transition from state '{state}' matches trigger '{trigger}'")]
  NoMatchingTransition { state: String, trigger: String },

  /// The dependency graph contains a cycle. `cycle` starts and ends on the same node.
  #[error("cyclic dependency: {}", cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error("unknown state: {state}")]
  UnknownState { state: String },

  #[error("invalid state machine definition: {message}")]
  InvalidDefinition { message: String },

  #[error("condition on transition {transition} failed to evaluate: {message}")]
  ConditionEvaluation { transition: usize, message: String },

  #[error("failed to render intent payload field '{field}': {message}")]
  TemplateResolution { field: String, message: String },

  #[error("duplicate node id: {node_id}")]
  DuplicateNode { node_id: String },

  #[error("node '{node_id}' depends on unknown node '{dependency}'")]
  UnknownDependency { node_id: String, dependency: String },
}

impl FsmError {
  pub fn invalid_definition(message: impl Into<String>) -> Self {
    Self::InvalidDefinition {
      message: message.into(),
    }
  }
}

use crate::output::ShapeViolation;
use crate::registry::{MatchTier, RoutingKey};

/// Errors raised while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
  /// Registration after freeze. A frozen [`HandlerRegistry`](crate::HandlerRegistry)
  /// has no registration methods, so only dynamic registries built on top of it
  /// return this.
  #[error("registry is frozen")]
  Frozen,

  #[error("handler '{handler_id}' is already registered for {key}")]
  DuplicateRoutingKey { handler_id: String, key: RoutingKey },

  #[error("handler '{handler_id}' is already registered")]
  DuplicateHandler { handler_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
  #[error("no handler for payload type '{payload_type}'")]
  NoHandler { payload_type: String },

  #[error("ambiguous {tier} match: {}", handlers.join(", "))]
  AmbiguousMatch {
    tier: MatchTier,
    handlers: Vec<String>,
  },
}

/// A failure reported by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
  #[error("handler failed: {message}")]
  Failed { message: String },

  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  #[error(transparent)]
  Shape(#[from] ShapeViolation),
}

impl HandlerError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }
}

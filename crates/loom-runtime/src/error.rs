use loom_bus::PublishError;
use loom_handler::{HandlerError, RoutingError, ShapeViolation};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  #[error(transparent)]
  Routing(#[from] RoutingError),

  #[error("handler '{handler_id}' failed")]
  Handler {
    handler_id: String,
    #[source]
    source: HandlerError,
  },

  /// A handler produced an output that breaks its contract. Always fatal.
  #[error("handler '{handler_id}' broke its output contract")]
  Shape {
    handler_id: String,
    #[source]
    source: ShapeViolation,
  },

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error("envelope runner channel closed")]
  ChannelClosed,
}

impl RuntimeError {
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      RuntimeError::Shape { .. }
        | RuntimeError::Handler {
          source: HandlerError::Shape(_),
          ..
        }
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
  /// The receiving side of the binding has gone away.
  #[error("event bus closed")]
  Closed,

  #[error("event bus rejected message: {message}")]
  Rejected { message: String },
}

impl PublishError {
  pub fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected {
      message: message.into(),
    }
  }
}

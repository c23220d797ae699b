use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
  #[error("priority must be between 1 and 10, got {value}")]
  InvalidPriority { value: u8 },
}

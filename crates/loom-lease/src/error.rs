use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaseError {
  /// A compare-and-swap saw a different epoch than the caller expected.
  #[error("lease '{lease_id}' epoch conflict: expected {expected}, found {actual}")]
  EpochConflict {
    lease_id: Uuid,
    expected: u64,
    actual: u64,
  },

  #[error("lease '{lease_id}' is held by '{holder}', not '{owner}'")]
  NotOwner {
    lease_id: Uuid,
    owner: String,
    holder: String,
  },

  #[error("lease '{lease_id}' not found")]
  NotFound { lease_id: Uuid },

  #[error("lease store error: {message}")]
  Store { message: String },
}

impl LeaseError {
  pub fn store(message: impl Into<String>) -> Self {
    Self::Store {
      message: message.into(),
    }
  }
}

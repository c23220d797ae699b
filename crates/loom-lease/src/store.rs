use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LeaseError;
use crate::handle::Lease;

/// Persisted lease state.
///
/// Reads must be linearizable with writes made by the same owner.
#[async_trait]
pub trait LeaseStore: Send + Sync {
  async fn load(&self, lease_id: Uuid) -> Result<Option<Lease>, LeaseError>;

  /// Write `lease` if the stored epoch equals `expected_epoch`.
  ///
  /// `None` means the lease must not exist yet.
  async fn compare_and_swap(&self, expected_epoch: Option<u64>, lease: Lease)
  -> Result<(), LeaseError>;
}

/// In-memory lease store, for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
  leases: Mutex<HashMap<Uuid, Lease>>,
}

impl InMemoryLeaseStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
  async fn load(&self, lease_id: Uuid) -> Result<Option<Lease>, LeaseError> {
    let leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(leases.get(&lease_id).cloned())
  }

  async fn compare_and_swap(
    &self,
    expected_epoch: Option<u64>,
    lease: Lease,
  ) -> Result<(), LeaseError> {
    let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
    let stored = leases.get(&lease.lease_id).map(|l| l.epoch);

    match (expected_epoch, stored) {
      (None, None) => {}
      (Some(expected), Some(actual)) if expected == actual => {}
      (Some(expected), Some(actual)) => {
        return Err(LeaseError::EpochConflict {
          lease_id: lease.lease_id,
          expected,
          actual,
        });
      }
      (Some(_), None) => {
        return Err(LeaseError::NotFound {
          lease_id: lease.lease_id,
        });
      }
      (None, Some(_)) => {
        return Err(LeaseError::store(format!(
          "lease '{}' already exists",
          lease.lease_id
        )));
      }
    }

    leases.insert(lease.lease_id, lease);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_in_memory_lease_store() {
    let store = InMemoryLeaseStore::new();
    let lease = Lease::new("a");

    assert_eq!(store.load(lease.lease_id).await.unwrap(), None);

    store.compare_and_swap(None, lease.clone()).await.unwrap();
    assert_eq!(store.load(lease.lease_id).await.unwrap(), Some(lease.clone()));

    assert!(store.compare_and_swap(None, lease.clone()).await.is_err());

    let next = Lease {
      epoch: 1,
      ..lease.clone()
    };
    store.compare_and_swap(Some(0), next.clone()).await.unwrap();
    assert_eq!(store.load(lease.lease_id).await.unwrap(), Some(next));

    let err = store.compare_and_swap(Some(0), lease).await.unwrap_err();
    assert!(matches!(err, LeaseError::EpochConflict { expected: 0, actual: 1, .. }));
  }
}

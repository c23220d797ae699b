use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loom_message::LeaseStamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LeaseError;
use crate::store::LeaseStore;

/// A point-in-time view of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
  pub lease_id: Uuid,
  pub owner: String,
  pub epoch: u64,
}

impl Lease {
  /// A fresh lease at epoch 0.
  pub fn new(owner: impl Into<String>) -> Self {
    Self {
      lease_id: Uuid::new_v4(),
      owner: owner.into(),
      epoch: 0,
    }
  }

  pub fn stamp(&self) -> LeaseStamp {
    LeaseStamp {
      lease_id: self.lease_id,
      epoch: self.epoch,
    }
  }

  fn advanced(&self, owner: &str) -> Self {
    Self {
      lease_id: self.lease_id,
      owner: owner.to_string(),
      epoch: self.epoch + 1,
    }
  }
}

/// Shared, in-memory handle to a lease.
///
/// Clones observe the same state. The owner and epoch sit behind one lock, so an
/// ownership change and its epoch increment are a single step. The lock is never
/// held across an await point.
#[derive(Debug, Clone)]
pub struct LeaseHandle {
  lease_id: Uuid,
  state: Arc<Mutex<Lease>>,
}

impl LeaseHandle {
  pub fn new(owner: impl Into<String>) -> Self {
    Self::from_lease(Lease::new(owner))
  }

  pub fn from_lease(lease: Lease) -> Self {
    Self {
      lease_id: lease.lease_id,
      state: Arc::new(Mutex::new(lease)),
    }
  }

  pub fn lease_id(&self) -> Uuid {
    self.lease_id
  }

  /// The epoch every validation reads from.
  pub fn current_epoch(&self) -> u64 {
    self.lock().epoch
  }

  pub fn owner(&self) -> String {
    self.lock().owner.clone()
  }

  pub fn snapshot(&self) -> Lease {
    self.lock().clone()
  }

  /// Renew ownership for the current holder, advancing the epoch by one.
  pub fn renew(&self, owner: &str) -> Result<Lease, LeaseError> {
    let mut state = self.lock();
    if state.owner != owner {
      return Err(LeaseError::NotOwner {
        lease_id: self.lease_id,
        owner: owner.to_string(),
        holder: state.owner.clone(),
      });
    }

    *state = state.advanced(owner);
    info!(lease_id = %self.lease_id, owner = %owner, epoch = state.epoch, "lease_renewed");
    Ok(state.clone())
  }

  /// Transfer ownership if the epoch is still `expected_epoch`.
  pub fn reclaim(&self, new_owner: &str, expected_epoch: u64) -> Result<Lease, LeaseError> {
    let mut state = self.lock();
    if state.epoch != expected_epoch {
      return Err(LeaseError::EpochConflict {
        lease_id: self.lease_id,
        expected: expected_epoch,
        actual: state.epoch,
      });
    }

    let previous = std::mem::replace(&mut *state, Lease {
      lease_id: self.lease_id,
      owner: new_owner.to_string(),
      epoch: expected_epoch + 1,
    });
    info!(
      lease_id = %self.lease_id,
      previous_owner = %previous.owner,
      owner = %new_owner,
      epoch = state.epoch,
      "lease_reclaimed"
    );
    Ok(state.clone())
  }

  /// Pull the authoritative state from a store.
  ///
  /// Epochs never move backwards: a stored record older than the local view is
  /// ignored.
  pub async fn refresh(&self, store: &dyn LeaseStore) -> Result<Lease, LeaseError> {
    let stored = store
      .load(self.lease_id)
      .await?
      .ok_or(LeaseError::NotFound {
        lease_id: self.lease_id,
      })?;

    let mut state = self.lock();
    if stored.epoch >= state.epoch {
      debug!(
        lease_id = %self.lease_id,
        local_epoch = state.epoch,
        stored_epoch = stored.epoch,
        "lease_refreshed"
      );
      *state = stored;
    }
    Ok(state.clone())
  }

  /// Renew through a store first, then apply the result locally.
  ///
  /// The store write is a compare-and-swap on the local epoch, so two owners racing
  /// through the same store cannot both advance it.
  pub async fn renew_in(&self, store: &dyn LeaseStore, owner: &str) -> Result<Lease, LeaseError> {
    let current = self.snapshot();
    if current.owner != owner {
      return Err(LeaseError::NotOwner {
        lease_id: self.lease_id,
        owner: owner.to_string(),
        holder: current.owner,
      });
    }

    let next = current.advanced(owner);
    store
      .compare_and_swap(Some(current.epoch), next.clone())
      .await?;

    let mut state = self.lock();
    if next.epoch > state.epoch {
      *state = next;
    }
    Ok(state.clone())
  }

  fn lock(&self) -> MutexGuard<'_, Lease> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::InMemoryLeaseStore;

  #[test]
  fn test_new_lease_starts_at_zero() {
    let handle = LeaseHandle::new("orchestrator-a");
    assert_eq!(handle.current_epoch(), 0);
    assert_eq!(handle.owner(), "orchestrator-a");
    assert_eq!(handle.snapshot().stamp().lease_id, handle.lease_id());
  }

  #[test]
  fn test_renew_advances_epoch_once() {
    let handle = LeaseHandle::new("a");
    let renewed = handle.renew("a").unwrap();
    assert_eq!(renewed.epoch, 1);
    assert_eq!(handle.current_epoch(), 1);
    assert_eq!(renewed.lease_id, handle.lease_id());
  }

  #[test]
  fn test_renew_by_other_owner_rejected() {
    let handle = LeaseHandle::new("a");
    let err = handle.renew("b").unwrap_err();
    assert!(matches!(err, LeaseError::NotOwner { ref holder, .. } if holder == "a"));
    assert_eq!(handle.current_epoch(), 0);
  }

  #[test]
  fn test_reclaim_is_compare_and_swap() {
    let handle = LeaseHandle::new("a");
    handle.renew("a").unwrap();

    let err = handle.reclaim("b", 0).unwrap_err();
    assert_eq!(
      err,
      LeaseError::EpochConflict {
        lease_id: handle.lease_id(),
        expected: 0,
        actual: 1
      }
    );

    let lease = handle.reclaim("b", 1).unwrap();
    assert_eq!(lease.owner, "b");
    assert_eq!(lease.epoch, 2);
  }

  #[test]
  fn test_clones_share_state() {
    let handle = LeaseHandle::new("a");
    let other = handle.clone();
    other.renew("a").unwrap();
    assert_eq!(handle.current_epoch(), 1);
  }

  #[tokio::test]
  async fn test_refresh_from_store() {
    let store = InMemoryLeaseStore::new();
    let lease = Lease::new("a");
    store.compare_and_swap(None, lease.clone()).await.unwrap();

    let handle = LeaseHandle::from_lease(lease.clone());
    let remote = LeaseHandle::from_lease(lease);
    remote.renew_in(&store, "a").await.unwrap();

    assert_eq!(handle.current_epoch(), 0);
    let refreshed = handle.refresh(&store).await.unwrap();
    assert_eq!(refreshed.epoch, 1);
    assert_eq!(handle.current_epoch(), 1);
  }

  #[tokio::test]
  async fn test_refresh_missing_lease() {
    let store = InMemoryLeaseStore::new();
    let handle = LeaseHandle::new("a");
    let err = handle.refresh(&store).await.unwrap_err();
    assert!(matches!(err, LeaseError::NotFound { .. }));
  }

  #[tokio::test]
  async fn test_renew_in_loses_race() {
    let store = InMemoryLeaseStore::new();
    let lease = Lease::new("a");
    store.compare_and_swap(None, lease.clone()).await.unwrap();

    let first = LeaseHandle::from_lease(lease.clone());
    let second = LeaseHandle::from_lease(lease);

    first.renew_in(&store, "a").await.unwrap();
    let err = second.renew_in(&store, "a").await.unwrap_err();
    assert!(matches!(err, LeaseError::EpochConflict { expected: 0, actual: 1, .. }));
    assert_eq!(second.current_epoch(), 0);
  }
}

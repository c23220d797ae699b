//! Leases grant one owner the right to execute Actions.
//!
//! A lease carries a monotonic epoch. Every Action is stamped with the epoch that
//! was current when it was dispatched, and is only allowed to run while that epoch
//! is still current. Renewing or reclaiming the lease advances the epoch by exactly
//! one, which invalidates every Action stamped before the change.

mod error;
mod handle;
mod store;

pub use error::LeaseError;
pub use handle::{Lease, LeaseHandle};
pub use store::{InMemoryLeaseStore, LeaseStore};

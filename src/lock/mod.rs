//! Exclusive locks over a shared lock store.
//!
//! Both lock variants run the same lease protocol ([`LeaseLock`]) and differ
//! only in how they resolve the key they protect:
//! - [`GlobalExclusiveLock`]: one fixed, store-wide key
//! - [`ScopedExclusiveLock`]: the identity of one document in a business
//!   collection, resolved on first use and fixed afterwards
//!
//! # Protocol
//!
//! - **claim**: read the record; if its lease expired, compare-and-delete it on
//!   the observed acquire time; then insert-if-absent. Only a successful insert
//!   proves acquisition. Any store fault is a failed attempt.
//! - **renew**: the record must exist and name the caller as holder, otherwise
//!   the lock is lost. This is an ownership check, not a lease check.
//! - **release**: delete the record if the caller holds it; never fails.

mod global;
mod lease;
mod scoped;

#[cfg(test)]
mod tests;

pub use global::{GlobalExclusiveLock, GlobalKey};
pub use lease::{KeyResolver, LeaseLock};
pub use scoped::{ScopedExclusiveLock, ScopedTarget};

use crate::error::{LockLost, Result};
use crate::store::LockKey;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A lease-backed lock on one key of a shared store.
pub trait ExclusiveLock: Send + Sync {
    /// Resolve the lock key and prepare the store, once.
    ///
    /// Later calls return immediately. Failing to resolve the key is reported
    /// here as [`LeaseError::Init`](crate::error::LeaseError::Init).
    fn initialize(&self) -> Result<()>;

    /// Try to become the holder. `true` only if this call inserted the record.
    fn try_claim(&self, client_id: &str) -> bool;

    /// Extend the lease held by `client_id`, returning the new acquire time.
    fn renew(&self, client_id: &str) -> std::result::Result<DateTime<Utc>, LockLost>;

    /// Give the lock up if `client_id` holds it. Idempotent.
    fn release(&self, client_id: &str);

    /// Acquire time of this instance's last successful claim or renewal.
    fn last_acquired_time(&self) -> Option<DateTime<Utc>>;

    fn lease_duration(&self) -> Duration;

    /// The resolved key, once initialized.
    fn key(&self) -> Option<LockKey>;

    /// The store clock.
    fn now(&self) -> DateTime<Utc>;
}

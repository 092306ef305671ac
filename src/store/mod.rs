//! Lock store contract and implementations.
//!
//! The store is the single source of truth for lock ownership. It holds at
//! most one [`LockRecord`] per [`LockKey`] and offers only conditional
//! mutations:
//! - insert-if-absent, the sole source of the mutual-exclusion guarantee
//! - compare-and-delete on an observed acquire time (stale lease takeover)
//! - update of the acquire time when the holder matches (renewal)
//! - delete when the holder matches (release)
//!
//! Expiry is never enforced by the store; readers compare the record's acquire
//! time against the store clock ([`LockStore::now`]).
//!
//! Two implementations are provided: [`MemoryLockStore`] for a single process
//! and tests, and [`FileLockStore`] for a directory shared between processes.

mod clock;
mod document;
mod file;
mod guard;
mod memory;
mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{DOCUMENT_ID_FIELD, DocumentSource, TargetFilter, document_id};
pub use file::FileLockStore;
pub use guard::{GuardMetadata, MutationGuard, owner_string};
pub use memory::MemoryLockStore;
pub use record::{
    DOCUMENT_LOCK_NAMESPACE, GLOBAL_LOCK_ID, GLOBAL_LOCK_NAMESPACE, LockKey, LockRecord,
    SCOPED_KEY_SEPARATOR, truncate_millis,
};

use crate::error::Result;
use chrono::{DateTime, Utc};

/// Outcome of [`LockStore::insert_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No record existed; the new record is now stored.
    Inserted,
    /// A record with the same key already exists; nothing was written.
    AlreadyExists,
}

/// CRUD store with a uniqueness constraint on the lock key and a clock.
///
/// Conditional operations return the number of records they affected (0 or 1).
pub trait LockStore: Send + Sync {
    /// One-time setup for the namespace of `key`.
    fn prepare(&self, _key: &LockKey) -> Result<()> {
        Ok(())
    }

    /// Read the record for `key`, if any.
    fn find_by_key(&self, key: &LockKey) -> Result<Option<LockRecord>>;

    /// Store `record` unless a record with the same key exists.
    fn insert_if_absent(&self, record: &LockRecord) -> Result<InsertOutcome>;

    /// Delete the record for `key` only if its acquire time is still `expected`.
    fn delete_if_acquire_time_matches(
        &self,
        key: &LockKey,
        expected: DateTime<Utc>,
    ) -> Result<u64>;

    /// Set the acquire time of the record for `key` only if `holder_id` holds it.
    fn update_acquire_time_if_holder_matches(
        &self,
        key: &LockKey,
        holder_id: &str,
        acquire_time: DateTime<Utc>,
    ) -> Result<u64>;

    /// Delete the record for `key` only if `holder_id` holds it.
    fn delete_if_holder_matches(&self, key: &LockKey, holder_id: &str) -> Result<u64>;

    /// All records, optionally restricted to one namespace, sorted by key.
    fn list(&self, namespace: Option<&str>) -> Result<Vec<LockRecord>>;

    /// Delete the record for `key` unconditionally (operator override).
    fn force_delete(&self, key: &LockKey) -> Result<u64>;

    /// The store clock used for every expiry comparison.
    fn now(&self) -> DateTime<Utc>;
}

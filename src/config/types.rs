//! Configuration types and defaults for leasehold.
//!
//! This module defines the lock scope enum, constants, and default value
//! functions used by the Config struct.

use crate::store::TargetFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default lease duration in milliseconds.
pub const DEFAULT_LEASE_DURATION_MS: u64 = 1000;

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default time to wait for a file-store mutation guard.
pub const DEFAULT_GUARD_TIMEOUT_MS: u64 = 2000;

/// Default age after which a file-store mutation guard is considered abandoned.
pub const DEFAULT_GUARD_STALE_AFTER_MS: u64 = 30_000;

/// Default file store directory, relative to the working directory.
pub const DEFAULT_STORE_ROOT: &str = ".leasehold";

/// Which lock the engine contends for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LockScope {
    /// One store-wide lock shared by every client (default).
    #[default]
    Global,
    /// A lock on the first document of `collection` whose `field` equals `value`.
    Scoped {
        collection: String,
        field: String,
        value: Value,
    },
}

impl LockScope {
    /// The target filter of a scoped lock.
    pub fn filter(&self) -> Option<TargetFilter> {
        match self {
            LockScope::Global => None,
            LockScope::Scoped { field, value, .. } => Some(TargetFilter::eq(field, value.clone())),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_lease_duration_ms() -> u64 {
    DEFAULT_LEASE_DURATION_MS
}
pub(crate) fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
pub(crate) fn default_guard_timeout_ms() -> u64 {
    DEFAULT_GUARD_TIMEOUT_MS
}
pub(crate) fn default_guard_stale_after_ms() -> u64 {
    DEFAULT_GUARD_STALE_AFTER_MS
}
pub(crate) fn default_store_root() -> std::path::PathBuf {
    std::path::PathBuf::from(DEFAULT_STORE_ROOT)
}

//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a leasehold client.
///
/// This struct represents the contents of a `leasehold.yaml` file.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lease settings
    // =========================================================================
    /// How long a claim stays valid without renewal.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Cadence of claim attempts while not holding the lock.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Which lock to contend for.
    #[serde(default)]
    pub scope: LockScope,

    /// Client identity recorded as the holder. Generated when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    // =========================================================================
    // Store settings
    // =========================================================================
    /// Directory shared by all contenders.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// How long a store mutation waits for the per-key guard.
    #[serde(default = "default_guard_timeout_ms")]
    pub guard_timeout_ms: u64,

    /// Age after which a leftover guard is removed.
    #[serde(default = "default_guard_stale_after_ms")]
    pub guard_stale_after_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lease_duration_ms: default_lease_duration_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            scope: LockScope::default(),
            client_id: None,
            store_root: default_store_root(),
            guard_timeout_ms: default_guard_timeout_ms(),
            guard_stale_after_ms: default_guard_stale_after_ms(),
        }
    }
}

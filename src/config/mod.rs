//! Configuration model for leasehold.
//!
//! This module defines the Config struct that represents a `leasehold.yaml`
//! file. It supports forward-compatible YAML parsing (unknown fields are
//! ignored), sensible defaults for optional fields, and validation of config
//! values. The lock variant is chosen here through [`LockScope`].

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::{
    DEFAULT_GUARD_STALE_AFTER_MS, DEFAULT_GUARD_TIMEOUT_MS, DEFAULT_LEASE_DURATION_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_STORE_ROOT, LockScope,
};

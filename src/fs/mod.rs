//! Filesystem utilities for leasehold.
//!
//! Atomic writes and exclusive creates used by the file-backed lock store.

pub mod atomic;

pub use atomic::{CreateOutcome, atomic_create, atomic_write};

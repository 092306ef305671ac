//! Leasehold: lease-based exclusive locks shared between processes.
//!
//! Contending processes coordinate through a shared [`store::LockStore`]. A
//! lock is a record naming its holder and the time it was last acquired; a
//! holder that stops renewing loses the lock once its lease expires, so a
//! crashed process never blocks the others for longer than one lease.
//!
//! - [`store`]: the store contract plus in-memory and file-backed stores
//! - [`lock`]: the global and document-scoped locks and their lease protocol
//! - [`engine`]: a background worker that claims, renews and releases a lock
//!   and reports acquisition and loss through callbacks
//!
//! ```no_run
//! use leasehold::engine::ExclusiveLockEngine;
//! use leasehold::lock::GlobalExclusiveLock;
//! use leasehold::store::FileLockStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> leasehold::error::Result<()> {
//! let store = Arc::new(FileLockStore::new(".leasehold"));
//! let lock = Arc::new(GlobalExclusiveLock::new(store, Duration::from_millis(1000)));
//! let engine = ExclusiveLockEngine::new(lock, Duration::from_millis(100));
//!
//! engine.start(
//!     "worker-1",
//!     || println!("Lock acquired"),
//!     |reason| println!("Lock lost, reason: {}", reason),
//! )?;
//! // ... do exclusive work while held ...
//! engine.stop("worker-1")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lock;
pub mod logging;
pub mod store;

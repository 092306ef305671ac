//! Error types for leasehold.
//!
//! Uses thiserror for derive macros. `LeaseError` covers store, setup and API
//! misuse failures; `LockLost` is the explicit outcome of a failed renewal.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for leasehold operations.
///
/// Each variant maps to a CLI exit code.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// The caller provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// Configuration could not be loaded or failed validation.
    #[error("config validation failed: {0}")]
    Config(String),

    /// The lock store rejected or failed an operation.
    #[error("lock store failure: {0}")]
    Store(String),

    /// The lock key could not be resolved or the store could not be prepared.
    #[error("lock initialization failed: {0}")]
    Init(String),

    /// `start` was called on an engine that already has a registered client.
    #[error("engine already has a registered client '{0}'; only one client is supported per engine")]
    AlreadyStarted(String),

    /// `stop` was called with a client id that is not the registered one.
    #[error("client '{given}' is not registered with this engine (registered: '{registered}')")]
    ClientMismatch { given: String, registered: String },
}

impl LeaseError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LeaseError::UserError(_) => exit_codes::USER_ERROR,
            LeaseError::Config(_) => exit_codes::USER_ERROR,
            LeaseError::Store(_) => exit_codes::STORE_FAILURE,
            LeaseError::Init(_) => exit_codes::STORE_FAILURE,
            LeaseError::AlreadyStarted(_) => exit_codes::LOCK_FAILURE,
            LeaseError::ClientMismatch { .. } => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for leasehold operations.
pub type Result<T> = std::result::Result<T, LeaseError>;

/// Why a holder no longer owns its lock.
///
/// Returned from renewal instead of being raised, so the engine can match on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockLost {
    /// No record exists for the key any more.
    #[error("lock record does not exist in the store")]
    Missing,

    /// The record is owned by a different client.
    #[error("lock is no longer held by this client (held by '{0}')")]
    HeldBy(String),

    /// Ownership could not be confirmed because the store failed.
    #[error("lock ownership could not be confirmed: {0}")]
    Store(String),

    /// The lock key could not be resolved.
    #[error("lock is not initialized: {0}")]
    Uninitialized(String),
}

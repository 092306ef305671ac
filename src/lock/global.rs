//! The store-wide global lock.

use super::lease::{KeyResolver, LeaseLock};
use crate::error::Result;
use crate::store::{LockKey, LockStore};
use std::sync::Arc;
use std::time::Duration;

/// Resolves to the fixed global key.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalKey;

impl KeyResolver for GlobalKey {
    fn resolve(&self) -> Result<LockKey> {
        Ok(LockKey::global())
    }
}

/// A single lock shared by every client of the store.
pub type GlobalExclusiveLock = LeaseLock<GlobalKey>;

impl LeaseLock<GlobalKey> {
    pub fn new(store: Arc<dyn LockStore>, lease_duration: Duration) -> Self {
        Self::with_resolver(store, GlobalKey, lease_duration)
    }
}

//! The lease protocol shared by every lock variant.

use super::ExclusiveLock;
use crate::error::{LockLost, Result};
use crate::store::{InsertOutcome, LockKey, LockRecord, LockStore, truncate_millis};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Strategy turning a lock's configuration into the key it protects.
pub trait KeyResolver: Send + Sync {
    /// Compute the key. Called at most once successfully per lock.
    fn resolve(&self) -> Result<LockKey>;
}

/// Lease lock on the key produced by `K`.
pub struct LeaseLock<K: KeyResolver> {
    store: Arc<dyn LockStore>,
    resolver: K,
    lease_duration: Duration,
    /// Set once by `initialize_key`; the mutex is the initialize-once guard.
    key: Mutex<Option<LockKey>>,
    last_acquired: Mutex<Option<DateTime<Utc>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl<K: KeyResolver> LeaseLock<K> {
    /// Create a lock on `store` whose key comes from `resolver`.
    pub fn with_resolver(store: Arc<dyn LockStore>, resolver: K, lease_duration: Duration) -> Self {
        Self {
            store,
            resolver,
            lease_duration,
            key: Mutex::new(None),
            last_acquired: Mutex::new(None),
        }
    }

    /// Resolve the key and prepare the store on first use.
    ///
    /// Concurrent first callers block until the first one finishes; a failed
    /// resolution is retried by the next caller.
    fn initialize_key(&self) -> Result<LockKey> {
        let mut slot = locked(&self.key);
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }

        let key = self.resolver.resolve()?;
        self.store.prepare(&key)?;
        info!(key = %key, "lock key resolved");

        *slot = Some(key.clone());
        Ok(key)
    }

    fn set_last_acquired(&self, value: Option<DateTime<Utc>>) {
        *locked(&self.last_acquired) = value;
    }

    fn claim(&self, client_id: &str) -> Result<bool> {
        let key = self.initialize_key()?;

        if let Some(existing) = self.store.find_by_key(&key)?
            && existing.is_expired(self.lease_duration, self.store.now())
        {
            // Only removes the record if nobody renewed or re-claimed it since we read it.
            let removed = self
                .store
                .delete_if_acquire_time_matches(&key, existing.acquire_time)?;
            debug!(
                key = %key,
                holder = %existing.holder_id,
                removed,
                "expired lease taken over"
            );
        }

        let record = LockRecord::new(key.clone(), client_id, self.store.now());
        match self.store.insert_if_absent(&record)? {
            InsertOutcome::Inserted => {
                self.set_last_acquired(Some(record.acquire_time));
                Ok(true)
            }
            InsertOutcome::AlreadyExists => Ok(false),
        }
    }

    fn extend(&self, client_id: &str) -> std::result::Result<DateTime<Utc>, LockLost> {
        let key = self
            .initialize_key()
            .map_err(|e| LockLost::Uninitialized(e.to_string()))?;

        let existing = self
            .store
            .find_by_key(&key)
            .map_err(|e| LockLost::Store(e.to_string()))?
            .ok_or(LockLost::Missing)?;

        if existing.holder_id != client_id {
            return Err(LockLost::HeldBy(existing.holder_id));
        }

        let now = truncate_millis(self.store.now());
        let updated = self
            .store
            .update_acquire_time_if_holder_matches(&key, client_id, now)
            .map_err(|e| LockLost::Store(e.to_string()))?;

        // Removed between the read and the update.
        if updated == 0 {
            return Err(LockLost::Missing);
        }
        Ok(now)
    }
}

impl<K: KeyResolver> ExclusiveLock for LeaseLock<K> {
    fn initialize(&self) -> Result<()> {
        self.initialize_key().map(|_| ())
    }

    fn try_claim(&self, client_id: &str) -> bool {
        match self.claim(client_id) {
            Ok(acquired) => {
                debug!(client_id, acquired, "claim attempt");
                acquired
            }
            Err(e) => {
                warn!(client_id, error = %e, "claim attempt failed");
                false
            }
        }
    }

    fn renew(&self, client_id: &str) -> std::result::Result<DateTime<Utc>, LockLost> {
        let outcome = self.extend(client_id);
        match &outcome {
            Ok(acquire_time) => {
                debug!(client_id, acquire_time = %acquire_time, "lease renewed");
                self.set_last_acquired(Some(*acquire_time));
            }
            Err(lost) => {
                debug!(client_id, reason = %lost, "lease renewal refused");
                self.set_last_acquired(None);
            }
        }
        outcome
    }

    fn release(&self, client_id: &str) {
        let released = self
            .initialize_key()
            .and_then(|key| self.store.delete_if_holder_matches(&key, client_id));

        match released {
            Ok(0) => debug!(client_id, "nothing to release"),
            Ok(_) => info!(client_id, "lock released"),
            Err(e) => warn!(client_id, error = %e, "lock release failed"),
        }
        self.set_last_acquired(None);
    }

    fn last_acquired_time(&self) -> Option<DateTime<Utc>> {
        *locked(&self.last_acquired)
    }

    fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    fn key(&self) -> Option<LockKey> {
        locked(&self.key).clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.store.now()
    }
}

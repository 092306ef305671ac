//! In-process lock store.
//!
//! Every operation runs under one mutex, which makes the conditional
//! mutations trivially atomic. Business documents for scoped locks are kept
//! in memory as JSON values.

use super::clock::{Clock, SystemClock};
use super::document::{DocumentSource, TargetFilter, document_id};
use super::record::{LockKey, LockRecord, truncate_millis};
use super::{InsertOutcome, LockStore};
use crate::error::{LeaseError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock store held entirely in memory.
pub struct MemoryLockStore {
    records: Mutex<BTreeMap<LockKey, LockRecord>>,
    documents: Mutex<HashMap<String, Vec<Value>>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl MemoryLockStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store using the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            documents: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Add a business document to `collection`.
    pub fn insert_document(&self, collection: &str, document: Value) {
        lock(&self.documents)
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Make every subsequent operation fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite or create a record, bypassing all preconditions.
    ///
    /// Simulates writes from processes outside the protocol.
    pub fn put_record(&self, record: LockRecord) {
        lock(&self.records).insert(record.key.clone(), record);
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<LockKey, LockRecord>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LeaseError::Store("store unavailable".to_string()));
        }
        Ok(lock(&self.records))
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl LockStore for MemoryLockStore {
    fn find_by_key(&self, key: &LockKey) -> Result<Option<LockRecord>> {
        Ok(self.records()?.get(key).cloned())
    }

    fn insert_if_absent(&self, record: &LockRecord) -> Result<InsertOutcome> {
        let mut records = self.records()?;
        if records.contains_key(&record.key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        records.insert(record.key.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn delete_if_acquire_time_matches(
        &self,
        key: &LockKey,
        expected: DateTime<Utc>,
    ) -> Result<u64> {
        let mut records = self.records()?;
        match records.get(key) {
            Some(existing) if existing.acquire_time == truncate_millis(expected) => {
                records.remove(key);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn update_acquire_time_if_holder_matches(
        &self,
        key: &LockKey,
        holder_id: &str,
        acquire_time: DateTime<Utc>,
    ) -> Result<u64> {
        let mut records = self.records()?;
        match records.get_mut(key) {
            Some(existing) if existing.holder_id == holder_id => {
                existing.acquire_time = truncate_millis(acquire_time);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn delete_if_holder_matches(&self, key: &LockKey, holder_id: &str) -> Result<u64> {
        let mut records = self.records()?;
        match records.get(key) {
            Some(existing) if existing.holder_id == holder_id => {
                records.remove(key);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn list(&self, namespace: Option<&str>) -> Result<Vec<LockRecord>> {
        Ok(self
            .records()?
            .values()
            .filter(|r| namespace.is_none_or(|ns| r.key.namespace == ns))
            .cloned()
            .collect())
    }

    fn force_delete(&self, key: &LockKey) -> Result<u64> {
        Ok(self.records()?.remove(key).map_or(0, |_| 1))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl DocumentSource for MemoryLockStore {
    fn find_first_id(&self, collection: &str, filter: &TargetFilter) -> Result<Option<String>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LeaseError::Store("store unavailable".to_string()));
        }
        Ok(lock(&self.documents)
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)))
            .and_then(document_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unavailable_store_fails_every_operation() {
        let store = MemoryLockStore::new();
        store.set_unavailable(true);

        let key = LockKey::global();
        assert!(store.find_by_key(&key).is_err());
        assert!(
            store
                .insert_if_absent(&LockRecord::new(key.clone(), "a", store.now()))
                .is_err()
        );
        assert!(store.delete_if_holder_matches(&key, "a").is_err());
        assert!(
            store
                .find_first_id("builds", &TargetFilter::eq("_id", 1))
                .is_err()
        );

        store.set_unavailable(false);
        assert!(store.find_by_key(&key).unwrap().is_none());
    }

    #[test]
    fn test_find_first_id_uses_first_match() {
        let store = MemoryLockStore::new();
        store.insert_document("builds", json!({"_id": 1, "status": "ready"}));
        store.insert_document("builds", json!({"_id": 2, "status": "ready"}));

        let id = store
            .find_first_id("builds", &TargetFilter::eq("status", "ready"))
            .unwrap();
        assert_eq!(id, Some("1".to_string()));

        let missing = store
            .find_first_id("builds", &TargetFilter::eq("_id", 99))
            .unwrap();
        assert_eq!(missing, None);

        let other = store
            .find_first_id("fixtures", &TargetFilter::eq("_id", 1))
            .unwrap();
        assert_eq!(other, None);
    }
}

//! Tests for the lease protocol.

use super::*;
use crate::error::LeaseError;
use crate::store::{
    Clock, DocumentSource, LockRecord, LockStore, ManualClock, MemoryLockStore, TargetFilter,
    truncate_millis,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const LEASE: Duration = Duration::from_millis(1000);

fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

fn setup() -> (Arc<ManualClock>, Arc<MemoryLockStore>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = Arc::new(MemoryLockStore::with_clock(clock.clone()));
    (clock, store)
}

fn global(store: &Arc<MemoryLockStore>) -> GlobalExclusiveLock {
    GlobalExclusiveLock::new(store.clone(), LEASE)
}

fn current(store: &MemoryLockStore) -> Option<LockRecord> {
    store.find_by_key(&LockKey::global()).unwrap()
}

#[test]
fn test_claim_on_empty_store() {
    let (_clock, store) = setup();
    let lock = global(&store);

    assert!(lock.try_claim("a"));

    let record = current(&store).unwrap();
    assert_eq!(record.holder_id, "a");
    assert_eq!(record.acquire_time, start_time());
    assert_eq!(lock.last_acquired_time(), Some(start_time()));
    assert_eq!(lock.key(), Some(LockKey::global()));
}

#[test]
fn test_unexpired_lease_blocks_other_client() {
    let (clock, store) = setup();
    let holder = global(&store);
    let contender = global(&store);
    assert!(holder.try_claim("a"));
    let before = current(&store).unwrap();

    clock.advance(Duration::from_millis(999));
    assert!(!contender.try_claim("b"));

    assert_eq!(current(&store).unwrap(), before);
    assert_eq!(contender.last_acquired_time(), None);
}

#[test]
fn test_lease_exactly_at_boundary_is_not_expired() {
    let (clock, store) = setup();
    assert!(global(&store).try_claim("a"));

    clock.advance(LEASE);
    assert!(!global(&store).try_claim("b"));

    clock.advance(Duration::from_millis(1));
    assert!(global(&store).try_claim("b"));
}

#[test]
fn test_expired_lease_is_taken_over() {
    let (clock, store) = setup();
    let crashed = global(&store);
    let contender = global(&store);
    assert!(crashed.try_claim("a"));

    clock.advance(LEASE + Duration::from_millis(1));
    assert!(contender.try_claim("b"));

    let record = current(&store).unwrap();
    assert_eq!(record.holder_id, "b");
    assert_eq!(record.acquire_time, truncate_millis(clock.now()));

    let lost = crashed.renew("a").unwrap_err();
    assert_eq!(lost, LockLost::HeldBy("b".to_string()));
    assert_eq!(crashed.last_acquired_time(), None);
}

#[test]
fn test_holder_cannot_reclaim_its_own_live_lease() {
    let (_clock, store) = setup();
    let lock = global(&store);

    assert!(lock.try_claim("a"));
    assert!(!lock.try_claim("a"));
}

#[test]
fn test_takeover_does_not_delete_renewed_record() {
    let (clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));
    let stale_observation = current(&store).unwrap().acquire_time;

    clock.advance(Duration::from_millis(500));
    lock.renew("a").unwrap();

    // A contender still holding the old observation cannot remove the renewed record.
    let removed = store
        .delete_if_acquire_time_matches(&LockKey::global(), stale_observation)
        .unwrap();
    assert_eq!(removed, 0);
    assert_eq!(current(&store).unwrap().holder_id, "a");
}

#[test]
fn test_renew_updates_acquire_time() {
    let (clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));

    clock.advance(Duration::from_millis(900));
    let renewed = lock.renew("a").unwrap();

    assert_eq!(renewed, truncate_millis(clock.now()));
    assert_eq!(current(&store).unwrap().acquire_time, renewed);
    assert_eq!(lock.last_acquired_time(), Some(renewed));
}

#[test]
fn test_renew_by_non_holder_is_lost_and_leaves_record() {
    let (_clock, store) = setup();
    assert!(global(&store).try_claim("a"));
    let before = current(&store).unwrap();

    let other = global(&store);
    let lost = other.renew("b").unwrap_err();

    assert_eq!(lost, LockLost::HeldBy("a".to_string()));
    assert_eq!(current(&store).unwrap(), before);
}

#[test]
fn test_renew_without_record_is_lost() {
    let (_clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));
    store.force_delete(&LockKey::global()).unwrap();

    assert_eq!(lock.renew("a").unwrap_err(), LockLost::Missing);
    assert_eq!(lock.last_acquired_time(), None);
}

#[test]
fn test_renew_ignores_lease_expiry_when_still_owner() {
    let (clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));

    // Nobody took over, so the late renewal still proves ownership.
    clock.advance(LEASE * 3);
    assert!(lock.renew("a").is_ok());
}

#[test]
fn test_renew_with_store_down_is_lost() {
    let (_clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));

    store.set_unavailable(true);
    let lost = lock.renew("a").unwrap_err();

    assert!(matches!(lost, LockLost::Store(_)));
    assert_eq!(lock.last_acquired_time(), None);
}

#[test]
fn test_claim_with_store_down_fails_quietly() {
    let (_clock, store) = setup();
    let lock = global(&store);
    store.set_unavailable(true);

    assert!(!lock.try_claim("a"));

    store.set_unavailable(false);
    assert!(lock.try_claim("a"));
}

#[test]
fn test_release_is_idempotent_and_holder_only() {
    let (_clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));
    let before = current(&store).unwrap();

    lock.release("b");
    assert_eq!(current(&store).unwrap(), before);

    lock.release("a");
    assert!(current(&store).is_none());
    assert_eq!(lock.last_acquired_time(), None);

    lock.release("a");
    lock.release("b");
    assert!(current(&store).is_none());
}

#[test]
fn test_release_with_store_down_does_not_panic() {
    let (_clock, store) = setup();
    let lock = global(&store);
    assert!(lock.try_claim("a"));

    store.set_unavailable(true);
    lock.release("a");

    assert_eq!(lock.last_acquired_time(), None);
}

#[test]
fn test_concurrent_claims_single_winner() {
    let (_clock, store) = setup();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let lock = GlobalExclusiveLock::new(store, LEASE);
                lock.try_claim(&format!("client-{}", i))
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(store.list(None).unwrap().len(), 1);
}

#[test]
fn test_concurrent_takeover_single_winner() {
    let (clock, store) = setup();
    assert!(global(&store).try_claim("crashed"));
    clock.advance(LEASE * 2);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let lock = GlobalExclusiveLock::new(store, LEASE);
                lock.try_claim(&format!("client-{}", i))
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_ne!(current(&store).unwrap().holder_id, "crashed");
}

// ============================================================================
// Scoped locks
// ============================================================================

fn scoped(store: &Arc<MemoryLockStore>, value: serde_json::Value) -> ScopedExclusiveLock {
    ScopedExclusiveLock::new(
        store.clone(),
        store.clone(),
        "builds",
        TargetFilter::eq("_id", value),
        LEASE,
    )
}

#[test]
fn test_scoped_key_uses_resolved_identity() {
    let (_clock, store) = setup();
    store.insert_document("builds", json!({"_id": 1, "fixtures": []}));
    let lock = scoped(&store, json!(1));

    assert!(lock.try_claim("a"));

    let key = LockKey::scoped("1", "builds");
    assert_eq!(lock.key(), Some(key.clone()));
    assert_eq!(store.find_by_key(&key).unwrap().unwrap().holder_id, "a");
    assert!(current(&store).is_none());
}

#[test]
fn test_scoped_locks_on_different_documents_are_independent() {
    let (_clock, store) = setup();
    store.insert_document("builds", json!({"_id": 1}));
    store.insert_document("builds", json!({"_id": 2}));

    assert!(scoped(&store, json!(1)).try_claim("a"));
    assert!(scoped(&store, json!(2)).try_claim("b"));
    assert!(!scoped(&store, json!(1)).try_claim("c"));
}

#[test]
fn test_scoped_missing_target_is_init_error() {
    let (_clock, store) = setup();
    let lock = scoped(&store, json!(99));

    let err = lock.initialize().unwrap_err();
    assert!(matches!(err, LeaseError::Init(_)));
    assert!(err.to_string().contains("no document in collection 'builds'"));

    assert!(!lock.try_claim("a"));
    assert!(matches!(lock.renew("a"), Err(LockLost::Uninitialized(_))));
    assert_eq!(lock.key(), None);
}

#[test]
fn test_scoped_key_is_fixed_after_first_resolution() {
    let (_clock, store) = setup();
    store.insert_document("builds", json!({"_id": 5, "status": "ready"}));
    let lock = ScopedExclusiveLock::new(
        store.clone(),
        store.clone(),
        "builds",
        TargetFilter::eq("status", "ready"),
        LEASE,
    );
    lock.initialize().unwrap();

    // A document added later must not change the key.
    store.insert_document("builds", json!({"_id": 4, "status": "ready"}));
    lock.initialize().unwrap();

    assert_eq!(lock.key(), Some(LockKey::scoped("5", "builds")));
}

struct CountingSource {
    inner: Arc<MemoryLockStore>,
    calls: std::sync::atomic::AtomicUsize,
}

impl DocumentSource for CountingSource {
    fn find_first_id(
        &self,
        collection: &str,
        filter: &TargetFilter,
    ) -> crate::error::Result<Option<String>> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        self.inner.find_first_id(collection, filter)
    }
}

#[test]
fn test_concurrent_first_use_resolves_once() {
    let (_clock, store) = setup();
    store.insert_document("builds", json!({"_id": 1}));
    let source = Arc::new(CountingSource {
        inner: store.clone(),
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let lock = Arc::new(ScopedExclusiveLock::new(
        store.clone(),
        source.clone(),
        "builds",
        TargetFilter::eq("_id", 1),
        LEASE,
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = lock.clone();
            thread::spawn(move || lock.initialize().is_ok())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

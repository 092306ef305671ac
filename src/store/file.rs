//! Lock store backed by a shared directory.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   global_lock/<id>.lock        one JSON LockRecord per key
//!   document_lock/<id>.lock
//!   <namespace>/<id>.guard       short-lived mutation guard
//!   collections/<name>.ndjson    business documents, one JSON object per line
//! ```
//!
//! Record files are published with an atomic exclusive create, so two
//! processes can never both insert the same key. Every conditional mutation
//! (and every insert) runs under the key's [`MutationGuard`], which makes the
//! read-compare-write sequences atomic with respect to each other.
//!
//! The store clock is the wall clock of the calling host; contenders sharing a
//! directory are expected to keep their clocks reasonably close.

use super::document::{DocumentSource, TargetFilter, document_id};
use super::guard::MutationGuard;
use super::record::{LockKey, LockRecord, truncate_millis};
use super::{InsertOutcome, LockStore};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::fs::{CreateOutcome, atomic_create, atomic_write};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const RECORD_EXTENSION: &str = "lock";
const GUARD_EXTENSION: &str = "guard";
const COLLECTIONS_DIR: &str = "collections";

/// Lock store rooted at a directory shared by all contenders.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    root: PathBuf,
    guard_timeout: Duration,
    guard_stale_after: Duration,
}

impl FileLockStore {
    /// Create a store rooted at `root` with default guard settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            guard_timeout: Duration::from_millis(crate::config::DEFAULT_GUARD_TIMEOUT_MS),
            guard_stale_after: Duration::from_millis(crate::config::DEFAULT_GUARD_STALE_AFTER_MS),
        }
    }

    /// Create a store from the configured root and guard settings.
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.store_root.clone(),
            guard_timeout: config.guard_timeout(),
            guard_stale_after: config.guard_stale_after(),
        }
    }

    pub fn with_guard_timeout(mut self, timeout: Duration) -> Self {
        self.guard_timeout = timeout;
        self
    }

    pub fn with_guard_stale_after(mut self, stale_after: Duration) -> Self {
        self.guard_stale_after = stale_after;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `key`.
    pub fn record_path(&self, key: &LockKey) -> PathBuf {
        self.namespace_dir(&key.namespace)
            .join(format!("{}.{}", encode_component(&key.id), RECORD_EXTENSION))
    }

    /// Path of the NDJSON file holding `collection`'s documents.
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root
            .join(COLLECTIONS_DIR)
            .join(format!("{}.ndjson", encode_component(collection)))
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(encode_component(namespace))
    }

    fn guard_path(&self, key: &LockKey) -> PathBuf {
        self.namespace_dir(&key.namespace)
            .join(format!("{}.{}", encode_component(&key.id), GUARD_EXTENSION))
    }

    fn guard(&self, key: &LockKey, operation: &str) -> Result<MutationGuard> {
        MutationGuard::acquire(
            &self.guard_path(key),
            operation,
            self.guard_timeout,
            self.guard_stale_after,
        )
    }

    fn remove_record(&self, key: &LockKey) -> Result<u64> {
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(1),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(LeaseError::Store(format!(
                "failed to delete lock record '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Read a record file; a missing file is `None`.
fn read_record(path: &Path) -> Result<Option<LockRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LeaseError::Store(format!(
                "failed to read lock record '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        LeaseError::Store(format!(
            "failed to parse lock record '{}': {}",
            path.display(),
            e
        ))
    })
}

fn to_json(record: &LockRecord) -> Result<String> {
    serde_json::to_string_pretty(record)
        .map_err(|e| LeaseError::Store(format!("failed to serialize lock record: {}", e)))
}

/// Make a key component safe to use as a file name.
///
/// ASCII alphanumerics and `-_.#` pass through; every other byte becomes `%XX`.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'#' => {
                encoded.push(byte as char)
            }
            b'.' if !encoded.is_empty() => encoded.push('.'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

impl LockStore for FileLockStore {
    fn prepare(&self, key: &LockKey) -> Result<()> {
        let dir = self.namespace_dir(&key.namespace);
        fs::create_dir_all(&dir).map_err(|e| {
            LeaseError::Store(format!(
                "failed to create lock directory '{}': {}",
                dir.display(),
                e
            ))
        })
    }

    fn find_by_key(&self, key: &LockKey) -> Result<Option<LockRecord>> {
        read_record(&self.record_path(key))
    }

    fn insert_if_absent(&self, record: &LockRecord) -> Result<InsertOutcome> {
        let _guard = self.guard(&record.key, "insert")?;
        let json = to_json(record)?;

        match atomic_create(self.record_path(&record.key), json.as_bytes())? {
            CreateOutcome::Created => Ok(InsertOutcome::Inserted),
            CreateOutcome::AlreadyExists => Ok(InsertOutcome::AlreadyExists),
        }
    }

    fn delete_if_acquire_time_matches(
        &self,
        key: &LockKey,
        expected: DateTime<Utc>,
    ) -> Result<u64> {
        let _guard = self.guard(key, "delete_if_acquire_time_matches")?;

        match read_record(&self.record_path(key))? {
            Some(existing) if existing.acquire_time == truncate_millis(expected) => {
                self.remove_record(key)
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
        let _guard = self.guard(key, "update_acquire_time")?;
        let path = self.record_path(key);

        match read_record(&path)? {
            Some(existing) if existing.holder_id == holder_id => {
                let renewed = LockRecord::new(existing.key, holder_id, acquire_time);
                atomic_write(&path, to_json(&renewed)?.as_bytes())?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn delete_if_holder_matches(&self, key: &LockKey, holder_id: &str) -> Result<u64> {
        let _guard = self.guard(key, "delete_if_holder_matches")?;

        match read_record(&self.record_path(key))? {
            Some(existing) if existing.holder_id == holder_id => self.remove_record(key),
            _ => Ok(0),
        }
    }

    fn list(&self, namespace: Option<&str>) -> Result<Vec<LockRecord>> {
        let mut records = Vec::new();

        if !self.root.exists() {
            return Ok(records);
        }

        let dirs: Vec<PathBuf> = match namespace {
            Some(ns) => vec![self.namespace_dir(ns)],
            None => fs::read_dir(&self.root)
                .map_err(|e| {
                    LeaseError::Store(format!(
                        "failed to read store directory '{}': {}",
                        self.root.display(),
                        e
                    ))
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_dir() && p.file_name().is_some_and(|n| n != COLLECTIONS_DIR))
                .collect(),
        };

        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                    continue;
                }

                // Records removed or rewritten while listing are skipped.
                match read_record(&path) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "skipping unreadable lock record"),
                }
            }
        }

        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn force_delete(&self, key: &LockKey) -> Result<u64> {
        let _guard = self.guard(key, "force_delete")?;
        self.remove_record(key)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl DocumentSource for FileLockStore {
    fn find_first_id(&self, collection: &str, filter: &TargetFilter) -> Result<Option<String>> {
        let path = self.collection_path(collection);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LeaseError::Store(format!(
                    "failed to open collection '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                LeaseError::Store(format!(
                    "failed to read collection '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let document: Value = serde_json::from_str(&line).map_err(|e| {
                LeaseError::Store(format!(
                    "invalid document at {}:{}: {}",
                    path.display(),
                    line_no + 1,
                    e
                ))
            })?;

            if filter.matches(&document) {
                return Ok(document_id(&document));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileLockStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileLockStore::new(temp_dir.path().join("store"));
        (temp_dir, store)
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("1_#_builds"), "1_#_builds");
        assert_eq!(encode_component("a/b"), "a%2Fb");
        assert_eq!(encode_component(".hidden"), "%2Ehidden");
        assert_eq!(encode_component("x.y"), "x.y");
    }

    #[test]
    fn test_record_path_layout() {
        let (_temp_dir, store) = store();

        let path = store.record_path(&LockKey::scoped("1", "builds"));
        assert!(path.ends_with("document_lock/1_#_builds.lock"));

        let global = store.record_path(&LockKey::global());
        assert!(global.starts_with(store.root().join("global_lock")));
    }

    #[test]
    fn test_record_file_is_json() {
        let (_temp_dir, store) = store();
        let record = LockRecord::new(LockKey::global(), "client-a", store.now());

        store.insert_if_absent(&record).unwrap();

        let content = fs::read_to_string(store.record_path(&record.key)).unwrap();
        let parsed: LockRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, record);
        assert!(!store.guard_path(&record.key).exists());
    }

    #[test]
    fn test_prepare_creates_namespace_dir() {
        let (_temp_dir, store) = store();

        store.prepare(&LockKey::global()).unwrap();

        assert!(store.root().join("global_lock").is_dir());
    }

    #[test]
    fn test_list_skips_collections_and_garbage() {
        let (_temp_dir, store) = store();
        let now = store.now();
        store
            .insert_if_absent(&LockRecord::new(LockKey::global(), "a", now))
            .unwrap();
        store
            .insert_if_absent(&LockRecord::new(LockKey::scoped("1", "builds"), "b", now))
            .unwrap();
        fs::create_dir_all(store.root().join(COLLECTIONS_DIR)).unwrap();
        fs::write(store.collection_path("builds"), "{\"_id\": 1}\n").unwrap();
        fs::write(store.root().join("global_lock").join("junk.lock"), "not json").unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key.namespace, "document_lock");
        assert_eq!(all[1].key.namespace, "global_lock");

        let global_only = store.list(Some("global_lock")).unwrap();
        assert_eq!(global_only.len(), 1);
        assert_eq!(global_only[0].holder_id, "a");
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let (_temp_dir, store) = store();
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_find_first_id_reads_ndjson() {
        let (_temp_dir, store) = store();
        let path = store.collection_path("builds");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lines = [
            json!({"_id": 1, "status": "done"}).to_string(),
            String::new(),
            json!({"_id": 2, "status": "ready"}).to_string(),
            json!({"_id": 3, "status": "ready"}).to_string(),
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let id = store
            .find_first_id("builds", &TargetFilter::eq("status", "ready"))
            .unwrap();
        assert_eq!(id, Some("2".to_string()));

        let none = store
            .find_first_id("builds", &TargetFilter::eq("status", "queued"))
            .unwrap();
        assert_eq!(none, None);

        let missing_collection = store
            .find_first_id("fixtures", &TargetFilter::eq("_id", 1))
            .unwrap();
        assert_eq!(missing_collection, None);
    }

    #[test]
    fn test_find_first_id_reports_bad_lines() {
        let (_temp_dir, store) = store();
        let path = store.collection_path("builds");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json}\n").unwrap();

        let err = store
            .find_first_id("builds", &TargetFilter::eq("_id", 1))
            .unwrap_err();
        assert!(err.to_string().contains(":1:"));
    }

    #[test]
    fn test_held_guard_turns_mutation_into_store_error() {
        let (_temp_dir, store) = store();
        let store = store.with_guard_timeout(Duration::from_millis(20));
        let key = LockKey::global();
        store.prepare(&key).unwrap();

        let _held = MutationGuard::acquire(
            &store.guard_path(&key),
            "test",
            Duration::from_millis(100),
            Duration::from_secs(30),
        )
        .unwrap();

        let result = store.insert_if_absent(&LockRecord::new(key.clone(), "a", store.now()));
        assert!(matches!(result, Err(LeaseError::Store(_))));
        assert!(store.find_by_key(&key).unwrap().is_none());
    }
}

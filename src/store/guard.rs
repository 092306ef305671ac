//! Per-key mutation guards for the file-backed store.
//!
//! A guard file is created with **create_new** semantics (exclusive create)
//! next to the record it protects, so only one process at a time can run a
//! read-compare-write sequence on that record. Guards are held for a few
//! milliseconds; one older than the stale threshold belongs to a process that
//! died mid-mutation and is removed.
//!
//! Guards are RAII objects that delete the guard file when dropped. If
//! deletion fails a warning is logged but nothing panics.
//!
//! A guard is never removed by path alone. The file is first renamed to a
//! unique side name, which atomically detaches whichever guard is current,
//! and only then inspected. A guard that turns out to belong to someone else
//! is linked back in place.

use crate::error::{LeaseError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

const GUARD_RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);

/// Metadata written into a guard file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardMetadata {
    /// Owner of the guard (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the guard holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// When the guard was taken.
    pub created_at: DateTime<Utc>,

    /// The store operation being performed.
    pub operation: String,

    /// Unique per acquisition; identifies the guard file as ours on release.
    #[serde(default)]
    pub token: String,
}

impl GuardMetadata {
    /// Create new guard metadata with the current timestamp.
    pub fn new(operation: &str) -> Self {
        Self {
            owner: owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            operation: operation.to_string(),
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Parse guard metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            LeaseError::Store(format!(
                "failed to read guard file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LeaseError::Store(format!(
                "failed to parse guard file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Calculate the age of the guard.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Whether the guard outlived `stale_after`.
    pub fn is_stale(&self, stale_after: std::time::Duration) -> bool {
        match Duration::from_std(stale_after) {
            Ok(threshold) => self.age() > threshold,
            Err(_) => false,
        }
    }
}

/// `user@host`, used to label guard files and default client ids.
pub fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// RAII guard for a mutation guard file.
#[derive(Debug)]
pub struct MutationGuard {
    path: PathBuf,
    token: String,
}

impl MutationGuard {
    /// Acquire the guard at `path`, waiting up to `timeout` for the current holder.
    ///
    /// A guard file older than `stale_after` (or unreadable after that long) is
    /// removed and acquisition retried.
    pub fn acquire(
        path: &Path,
        operation: &str,
        timeout: std::time::Duration,
        stale_after: std::time::Duration,
    ) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let metadata = GuardMetadata::new(operation);
        let json = serde_json::to_string(&metadata)
            .map_err(|e| LeaseError::Store(format!("failed to serialize guard metadata: {}", e)))?;

        loop {
            match try_create(path, json.as_bytes()) {
                Ok(()) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token: metadata.token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_if_stale(path, stale_after) {
                        continue;
                    }
                }
                Err(e) => {
                    return Err(LeaseError::Store(format!(
                        "failed to acquire guard '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }

            if Instant::now() >= deadline {
                return Err(LeaseError::Store(format!(
                    "timed out after {}ms waiting for guard '{}'",
                    timeout.as_millis(),
                    path.display()
                )));
            }
            thread::sleep(GUARD_RETRY_INTERVAL);
        }
    }

    /// Get the path to the guard file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        let ours = |detached: &Path| {
            GuardMetadata::from_file(detached).is_ok_and(|meta| meta.token == self.token)
        };

        match remove_guard_if(&self.path, ours) {
            Ok(Removal::Removed) => {}
            Ok(Removal::Missing | Removal::Kept) => {
                warn!(guard = %self.path.display(), "mutation guard was broken as stale while held");
            }
            Err(e) => {
                warn!(guard = %self.path.display(), error = %e, "failed to release mutation guard");
            }
        }
    }
}

/// Outcome of [`remove_guard_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Removed,
    /// No guard file existed.
    Missing,
    /// The guard failed the check and was put back.
    Kept,
}

/// Detach the guard at `path` and delete it only if `accept` approves the
/// detached file. A rejected guard is linked back unless a new guard has
/// already been created at `path`.
fn remove_guard_if(path: &Path, accept: impl Fn(&Path) -> bool) -> std::io::Result<Removal> {
    let detached = detached_path(path);
    match fs::rename(path, &detached) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Removal::Missing),
        Err(e) => return Err(e),
    }

    if accept(&detached) {
        fs::remove_file(&detached)?;
        return Ok(Removal::Removed);
    }

    if let Err(e) = fs::hard_link(&detached, path) {
        warn!(guard = %path.display(), error = %e, "could not restore mutation guard");
    }
    let _ = fs::remove_file(&detached);
    Ok(Removal::Kept)
}

/// A unique sibling name; the dot prefix and suffix keep it out of store listings.
fn detached_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "guard".to_string());
    path.with_file_name(format!(".{}.{}.detached", name, Uuid::new_v4().simple()))
}

fn try_create(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

    let written = file.write_all(content).and_then(|_| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Remove the guard at `path` if it is stale. Returns whether it was removed.
///
/// Staleness is judged on the detached file, so a fresh guard created after
/// the caller saw a stale one is never removed.
fn break_if_stale(path: &Path, stale_after: std::time::Duration) -> bool {
    if !is_stale_file(path, stale_after) {
        return false;
    }

    match remove_guard_if(path, |detached| is_stale_file(detached, stale_after)) {
        Ok(Removal::Removed) => {
            warn!(guard = %path.display(), "removed stale mutation guard");
            true
        }
        // Vanished in between; retry the create straight away.
        Ok(Removal::Missing) => true,
        Ok(Removal::Kept) => false,
        Err(e) => {
            warn!(guard = %path.display(), error = %e, "failed to remove stale mutation guard");
            false
        }
    }
}

fn is_stale_file(path: &Path, stale_after: std::time::Duration) -> bool {
    match GuardMetadata::from_file(path) {
        Ok(meta) => meta.is_stale(stale_after),
        // Partially written or vanished; fall back to the file's mtime.
        Err(_) => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > stale_after),
    }
}

//! Atomic filesystem operations for the file-backed lock store.
//!
//! Lock records must never be observed half-written by another process, so
//! every write goes through a temporary file in the same directory:
//! 1. Write content to a uniquely named temporary file
//! 2. Sync the file to disk (fsync)
//! 3. Publish it, either replacing the target (`atomic_write`) or only if the
//!    target does not exist yet (`atomic_create`)
//!
//! Source and destination must be on the same filesystem. On crash a temporary
//! file named `.{filename}.{uuid}.tmp` may remain next to the target.

use crate::error::{LeaseError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Outcome of [`atomic_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The target did not exist and now holds the new content.
    Created,
    /// The target already existed and was left untouched.
    AlreadyExists,
}

/// Atomically write bytes to a file, replacing any existing content.
///
/// Readers see either the previous content or the new content, never a
/// partial write.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    // rename() replaces the destination atomically on every supported platform
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        LeaseError::Store(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    sync_parent(path);
    Ok(())
}

/// Atomically create a file with the given content, only if it does not exist.
///
/// The content is staged in a temporary file and published with a hard link,
/// which fails when the target exists. This gives exclusive-create semantics
/// without ever exposing an empty or partial file.
pub fn atomic_create<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<CreateOutcome> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);

    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(CreateOutcome::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(LeaseError::Store(format!(
            "failed to create '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LeaseError::Store(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Generate a unique temporary file path in the same directory as the target.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LeaseError::Store("invalid file path".to_string()))?;

    let temp_name = format!(".{}.{}.tmp", filename, uuid::Uuid::new_v4().simple());
    Ok(parent.join(temp_name))
}

/// Write content to a file and sync to disk.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        LeaseError::Store(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        LeaseError::Store(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        LeaseError::Store(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

/// Persist the directory entry of a freshly published file.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

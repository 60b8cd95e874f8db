//! Spooled buffer entries with atomic file operations.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use thiserror::Error;

use crate::persistence::write_atomic;
use crate::types::{EntryKey, Identity};

/// Errors that can occur during spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry with this key is already spooled.
    #[error("duplicate entry key: {0}")]
    DuplicateEntry(EntryKey),

    /// Entry key is not safe to use as a file name.
    #[error("invalid entry key: contains unsafe characters: {0}")]
    InvalidKey(EntryKey),

    /// Identity is not safe to use as a directory name.
    #[error("invalid identity: contains unsafe characters: {0}")]
    InvalidIdentity(Identity),
}

/// Result type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

/// Whether `name` can be used as a single path component.
///
/// Rejects empty names, path separators, null bytes, and names starting with
/// a dot (hidden files, `.` and `..`).
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
        && !name.starts_with('.')
}

pub fn validate_key(key: &EntryKey) -> Result<()> {
    if is_safe_component(key.as_str()) {
        Ok(())
    } else {
        Err(SpoolError::InvalidKey(key.clone()))
    }
}

pub fn validate_identity(identity: &Identity) -> Result<()> {
    if is_safe_component(identity.as_str()) {
        Ok(())
    } else {
        Err(SpoolError::InvalidIdentity(identity.clone()))
    }
}

/// Returns the buffer directory of `identity`: `<spool_dir>/<identity>/`.
pub fn buffer_dir(spool_dir: &Path, identity: &Identity) -> Result<PathBuf> {
    validate_identity(identity)?;
    Ok(spool_dir.join(identity.as_str()))
}

/// Returns the payload path of an entry: `<buffer_dir>/<key>.json`.
pub fn entry_path(buffer_dir: &Path, key: &EntryKey) -> PathBuf {
    buffer_dir.join(format!("{}.json", key.as_str()))
}

static KEY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh entry key.
///
/// Keys are `<micros since epoch, 20 digits>-<sequence, 6 digits>`, so they
/// sort in arrival order within a process.
pub fn next_entry_key() -> EntryKey {
    let micros = Utc::now().timestamp_micros().max(0);
    let seq = KEY_SEQ.fetch_add(1, Ordering::Relaxed) % 1_000_000;
    EntryKey::new(format!("{micros:020}-{seq:06}"))
}

/// Spools an entry to disk atomically.
///
/// Creates the buffer directory if needed.
///
/// # Errors
///
/// Returns `SpoolError::DuplicateEntry` if the key is already spooled.
/// Returns `SpoolError::Io` for filesystem errors.
pub fn spool_entry(buffer_dir: &Path, key: &EntryKey, value: &serde_json::Value) -> Result<PathBuf> {
    validate_key(key)?;

    std::fs::create_dir_all(buffer_dir)?;

    let path = entry_path(buffer_dir, key);
    if path.exists() {
        return Err(SpoolError::DuplicateEntry(key.clone()));
    }

    let bytes = serde_json::to_vec(value)?;
    write_atomic(&path, &bytes)?;

    Ok(path)
}

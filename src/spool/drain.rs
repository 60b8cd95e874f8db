//! Listing and draining spooled entries.
//!
//! The listing is the batch a source delivers; draining is the acknowledgment
//! that removes entries once they have been applied.

use std::io;
use std::path::Path;

use tracing::warn;

use crate::persistence::{fsync_dir, is_temp_name};
use crate::types::{Batch, BufferEntry, EntryKey};

use super::entry::{Result, entry_path, validate_key};

/// Lists every spooled entry, sorted by key.
///
/// Only `<key>.json` files count; temp files and unrelated files are ignored.
/// A payload that is not valid JSON is still listed, with a `null` value, so
/// that applying it fails at a visible position instead of being skipped.
///
/// # Errors
///
/// Returns an error if the buffer directory cannot be read.
pub fn list_pending(buffer_dir: &Path) -> Result<Batch> {
    if !buffer_dir.exists() {
        return Ok(Vec::new());
    }

    let mut pending = Vec::new();

    for entry in std::fs::read_dir(buffer_dir)? {
        let path = entry?.path();

        let Some(key) = extract_key(&path) else {
            continue;
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            // Drained between read_dir and read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Spooled entry is not valid JSON");
            serde_json::Value::Null
        });

        pending.push(BufferEntry { key, value });
    }

    pending.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(pending)
}

/// Removes exactly the entries named by `keys`.
///
/// Entries not named are kept, whatever their key. Returns how many entries
/// were removed; the directory is fsynced when anything was.
pub fn drain_entries(buffer_dir: &Path, keys: &[EntryKey]) -> Result<usize> {
    let mut removed = 0;

    for key in keys {
        validate_key(key)?;
        match std::fs::remove_file(entry_path(buffer_dir, key)) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    if removed > 0 {
        fsync_dir(buffer_dir)?;
    }

    Ok(removed)
}

/// Removes temp files left behind by a spool write that was interrupted.
///
/// Call once before a buffer is watched.
pub fn cleanup_temp_files(buffer_dir: &Path) -> Result<usize> {
    if !buffer_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;

    for entry in std::fs::read_dir(buffer_dir)? {
        let path = entry?.path();
        let is_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_temp_name);

        if is_temp && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    if removed > 0 {
        fsync_dir(buffer_dir)?;
    }

    Ok(removed)
}

/// Extracts the entry key from a payload path (`<buffer_dir>/<key>.json`).
fn extract_key(path: &Path) -> Option<EntryKey> {
    if !path.extension().is_some_and(|e| e == "json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(EntryKey::new(stem))
}

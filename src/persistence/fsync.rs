//! fsync helpers.
//!
//! Creating or renaming a file only updates the directory entry. Both the file
//! and its directory are synced so a note write or a buffer entry survives a
//! power loss once the call returns.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created, renamed or removed in it are
/// durable.
///
/// # Errors
///
/// Returns an error if the path doesn't exist or the sync fails.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

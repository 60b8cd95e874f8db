//! Whole-file replacement that readers never observe half-written.
//!
//! Used for note files, buffer entries and the settings file:
//! 1. Create a uniquely named hidden temp file next to the target
//!    (`.<name>.<random>.tmp`)
//! 2. Write and fsync it
//! 3. Rename over the target
//! 4. fsync the parent directory
//!
//! The temp file is created exclusively, so an existing file is never
//! truncated or renamed away, whatever its name.

use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

use super::fsync::{fsync_dir, fsync_file};

/// Suffix of every temp file created by [`write_atomic`].
pub const TEMP_SUFFIX: &str = ".tmp";

/// Whether `name` looks like a temp file left behind by [`write_atomic`].
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Replaces the full contents of `path` with `bytes`.
///
/// The parent directory must already exist.
///
/// # Errors
///
/// Returns an error if any IO operation fails. On failure the previous
/// contents of `path` are left in place and the temp file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy();

    let mut tmp = Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    fsync_file(tmp.as_file())?;

    tmp.persist(path).map_err(|e| e.error)?;
    fsync_dir(parent)
}

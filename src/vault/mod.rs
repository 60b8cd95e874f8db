//! The filesystem collaborator notes are written into.
//!
//! Paths are vault-relative strings using `/` as the separator, the same shape
//! events carry them in. The [`Vault`] trait is the only way the content writer
//! touches storage, which lets the core be tested against an in-memory vault.

use std::future::Future;
use std::io;

pub mod local;

pub use local::LocalVault;

/// What kind of entry exists at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Storage operations needed to apply note updates.
///
/// # Example (in-memory, for tests)
///
/// ```ignore
/// struct MemoryVault {
///     files: Mutex<BTreeMap<String, String>>,
/// }
///
/// impl Vault for MemoryVault {
///     async fn read(&self, path: &str) -> io::Result<String> {
///         self.files.lock().unwrap().get(path).cloned()
///             .ok_or_else(|| io::ErrorKind::NotFound.into())
///     }
///     // ...
/// }
/// ```
pub trait Vault {
    /// Whether any entry (file or directory) exists at `path`.
    fn exists(&self, path: &str) -> impl Future<Output = io::Result<bool>> + Send;

    /// Creates `path` as a directory, along with any missing ancestors.
    fn mkdir(&self, path: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Reads the full contents of the file at `path`.
    fn read(&self, path: &str) -> impl Future<Output = io::Result<String>> + Send;

    /// Replaces the full contents of the file at `path`, creating it if needed.
    fn write(&self, path: &str, content: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Reports whether `path` is a file or a directory.
    fn stat(&self, path: &str) -> impl Future<Output = io::Result<EntryKind>> + Send;

    /// The parent of `path`, or an empty string for top-level entries.
    fn parent_path(&self, path: &str) -> String {
        parent_path(path)
    }
}

/// Returns everything before the last `/` of a vault path.
///
/// ```
/// use notesync::vault::parent_path;
///
/// assert_eq!(parent_path("daily/2024-01-01.md"), "daily");
/// assert_eq!(parent_path("a/b/c.md"), "a/b");
/// assert_eq!(parent_path("inbox.md"), "");
/// ```
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

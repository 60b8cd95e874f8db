//! A vault backed by a directory on the local filesystem.

use std::io;
use std::path::{Component, Path, PathBuf};

use super::{EntryKind, Vault};
use crate::persistence::write_atomic;

/// A [`Vault`] rooted at a local directory.
///
/// Vault paths are resolved relative to the root. Absolute paths and paths
/// containing `..` are rejected with [`io::ErrorKind::InvalidInput`] so an
/// event can never write outside the root.
#[derive(Debug, Clone)]
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalVault { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a vault path to a filesystem path under the root.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let mut resolved = self.root.clone();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes the vault: {path}"),
                    ));
                }
            }
        }

        Ok(resolved)
    }
}

impl Vault for LocalVault {
    async fn exists(&self, path: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.resolve(path)?).await
    }

    async fn mkdir(&self, path: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(self.resolve(path)?).await
    }

    async fn read(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_to_string(self.resolve(path)?).await
    }

    async fn write(&self, path: &str, content: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        let bytes = content.as_bytes().to_vec();

        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(io::Error::other)?
    }

    async fn stat(&self, path: &str) -> io::Result<EntryKind> {
        let metadata = tokio::fs::metadata(self.resolve(path)?).await?;
        if metadata.is_dir() {
            Ok(EntryKind::Directory)
        } else {
            Ok(EntryKind::File)
        }
    }
}

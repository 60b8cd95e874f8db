//! Applies a single note event to the vault.
//!
//! A write is a read-modify-write of the whole file: the new content is
//! computed from the existing content, the payload and the newline policy,
//! then written back in one replacement.
//!
//! # Newline composition
//!
//! | target             | result                                           |
//! |--------------------|--------------------------------------------------|
//! | missing            | `payload` + terminator (nothing under `None`)    |
//! | empty file         | `payload`                                        |
//! | ends with `\n`     | `existing` + `payload`                           |
//! | other content      | `existing` + terminator (or `\n`) + `payload`    |
//!
//! A file created under `Unix` or `Windows` already ends with the terminator,
//! so the next append does not add a second one.
//!
//! The `ends with \n` row applies to any file, including notes the user
//! wrote by hand: appending `B` to `"A\n"` gives `"A\nB"`, not `"A\n\nB"`.
//! Two events applied to a new file therefore read `"first\nsecond"` with no
//! blank line between them.

use std::io;

use thiserror::Error;
use tracing::{debug, trace};

use crate::types::{Event, NewlinePolicy};
use crate::vault::{EntryKind, Vault};

/// Errors from applying one event.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The event's path is missing, empty, or escapes the vault.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The event is not an object with string `data`.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The target's parent directory could not be created.
    #[error("could not create directory {path}: {source}")]
    DirectoryCreateFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The target path is an existing directory.
    #[error("path {0} exists as a folder, expected a file path")]
    PathIsDirectory(String),

    /// Reading or writing the target failed.
    #[error("could not write to file {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl WriteError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        WriteError::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    fn write_failed(path: &str) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| WriteError::WriteFailed {
            path: path.to_string(),
            source,
        }
    }
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Strips trailing separators and checks the path stays inside the vault.
pub fn normalize_path(raw: &str) -> Result<&str> {
    let path = raw.trim_end_matches('/');

    if path.is_empty() {
        return Err(WriteError::invalid_path(raw, "empty after normalization"));
    }
    if path.starts_with('/') {
        return Err(WriteError::invalid_path(raw, "must be relative to the vault"));
    }
    if path.split('/').any(|part| part == "..") {
        return Err(WriteError::invalid_path(raw, "must not contain '..'"));
    }

    Ok(path)
}

/// Computes the content a target should hold after appending `payload`.
///
/// `existing` is `None` when the target does not exist yet.
pub fn compose_content(existing: Option<&str>, payload: &str, policy: NewlinePolicy) -> String {
    match existing {
        None => {
            let mut content = payload.to_string();
            if let Some(terminator) = policy.terminator() {
                content.push_str(terminator);
            }
            content
        }
        Some("") => payload.to_string(),
        Some(existing) if existing.ends_with('\n') => format!("{existing}{payload}"),
        Some(existing) => {
            let separator = policy.terminator().unwrap_or("\n");
            format!("{existing}{separator}{payload}")
        }
    }
}

/// Appends an event's content to its target file.
///
/// Creates the parent directory when it is missing. Nothing is written when
/// any check fails.
pub async fn write_event<V: Vault>(
    vault: &V,
    event: &Event,
    policy: NewlinePolicy,
) -> Result<()> {
    let path = normalize_path(event.target.primary())?;

    let parent = vault.parent_path(path);
    if !parent.is_empty() && parent != "." && parent != path {
        let parent_exists = vault.exists(&parent).await.map_err(|source| {
            WriteError::DirectoryCreateFailed {
                path: parent.clone(),
                source,
            }
        })?;
        if !parent_exists {
            vault
                .mkdir(&parent)
                .await
                .map_err(|source| WriteError::DirectoryCreateFailed {
                    path: parent.clone(),
                    source,
                })?;
            debug!(dir = %parent, "Created directory");
        }
    }

    let existing = if vault.exists(path).await.map_err(WriteError::write_failed(path))? {
        if vault.stat(path).await.map_err(WriteError::write_failed(path))? == EntryKind::Directory {
            return Err(WriteError::PathIsDirectory(path.to_string()));
        }
        Some(vault.read(path).await.map_err(WriteError::write_failed(path))?)
    } else {
        None
    };

    let content = compose_content(existing.as_deref(), &event.content, policy);
    vault
        .write(path, &content)
        .await
        .map_err(WriteError::write_failed(path))?;

    trace!(
        path = %path,
        created = existing.is_none(),
        bytes = content.len(),
        "Wrote note"
    );
    Ok(())
}

//! Note update events and the newline policy used to apply them.

use serde::{Deserialize, Serialize};

use super::ids::EntryKey;

/// Which line terminator, if any, is placed between and after applied notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewlinePolicy {
    /// No terminator is configured.
    #[default]
    None,
    /// `\n`
    Unix,
    /// `\r\n`
    Windows,
}

impl NewlinePolicy {
    /// The configured terminator, or `None` when no policy is set.
    pub fn terminator(self) -> Option<&'static str> {
        match self {
            NewlinePolicy::None => None,
            NewlinePolicy::Unix => Some("\n"),
            NewlinePolicy::Windows => Some("\r\n"),
        }
    }
}

/// Where an event wants its content written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    /// A single target path.
    Single(String),
    /// Ordered candidate paths. Never empty; only the first is used.
    Candidates(Vec<String>),
}

impl PathSpec {
    /// The path that is actually written to.
    pub fn primary(&self) -> &str {
        match self {
            PathSpec::Single(path) => path,
            PathSpec::Candidates(paths) => paths.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Candidates after the first, which are never written to.
    pub fn ignored(&self) -> &[String] {
        match self {
            PathSpec::Single(_) => &[],
            PathSpec::Candidates(paths) => paths.get(1..).unwrap_or(&[]),
        }
    }
}

/// A decoded note update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The text to append.
    pub content: String,
    /// The file to append it to.
    pub target: PathSpec,
}

impl Event {
    pub fn new(content: impl Into<String>, target: PathSpec) -> Self {
        Event {
            content: content.into(),
            target,
        }
    }
}

/// One entry of a remote buffer, exactly as the source delivered it.
///
/// The raw `value` is kept undecoded: decoding happens when the entry is
/// applied, and the raw value of the last applied entry is what a drain
/// request carries back to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferEntry {
    /// Ordering key within the buffer.
    pub key: EntryKey,
    /// Raw event payload, e.g. `{"data": "...", "path": "notes/a.md"}`.
    pub value: serde_json::Value,
}

impl BufferEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        BufferEntry {
            key: EntryKey::new(key),
            value,
        }
    }
}

/// The entries delivered by one notification, in application order.
pub type Batch = Vec<BufferEntry>;

//! Applies a batch of buffer entries to the vault, strictly in order.
//!
//! The batch is folded into an [`ApplicationOutcome`]: each entry is decoded
//! and written before the next one starts, and the first failure ends the
//! batch. Entries after a failure are never attempted, so the applied prefix
//! of a batch is always contiguous.

use std::ops::ControlFlow;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::types::{BufferEntry, EntryKey, Event, NewlinePolicy, PathSpec};
use crate::vault::Vault;
use crate::writer::{WriteError, write_event};

/// Decodes a raw buffer value into an [`Event`].
///
/// `path` must be a string or a non-empty array of strings, and `data` must
/// be a string.
pub fn decode_event(value: &Value) -> Result<Event, WriteError> {
    let target = match value.get("path") {
        Some(Value::String(path)) => PathSpec::Single(path.clone()),
        Some(Value::Array(items)) if !items.is_empty() => {
            let paths = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    WriteError::invalid_path(
                        Value::Array(items.clone()).to_string(),
                        "path list must contain only strings",
                    )
                })?;
            PathSpec::Candidates(paths)
        }
        Some(Value::Array(_)) => {
            return Err(WriteError::invalid_path("[]", "path list is empty"));
        }
        Some(other) => {
            return Err(WriteError::invalid_path(
                other.to_string(),
                "path must be a string or a list",
            ));
        }
        None => return Err(WriteError::invalid_path("", "path is missing")),
    };

    let content = match value.get("data") {
        Some(Value::String(data)) => data.clone(),
        Some(other) => {
            return Err(WriteError::MalformedEvent(format!(
                "data must be a string, got {other}"
            )));
        }
        None => return Err(WriteError::MalformedEvent("data is missing".to_string())),
    };

    Ok(Event { content, target })
}

/// Where and why a batch stopped.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the failed entry within the batch.
    pub index: usize,
    /// Key of the failed entry.
    pub key: EntryKey,
    pub error: WriteError,
}

/// The result of applying one batch.
#[derive(Debug, Default)]
pub struct ApplicationOutcome {
    /// Number of entries written, always a prefix of the batch.
    pub applied: usize,
    /// The failure that stopped the batch, if any.
    pub failure: Option<BatchFailure>,
    /// The last entry that was written.
    pub last: Option<BufferEntry>,
}

impl ApplicationOutcome {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failed_at(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.index)
    }

    /// Folds the result of one entry into the outcome.
    ///
    /// Returns `Break` once the batch must stop.
    fn record(
        &mut self,
        index: usize,
        entry: &BufferEntry,
        result: Result<(), WriteError>,
    ) -> ControlFlow<()> {
        match result {
            Ok(()) => {
                self.applied += 1;
                self.last = Some(entry.clone());
                ControlFlow::Continue(())
            }
            Err(error) => {
                self.failure = Some(BatchFailure {
                    index,
                    key: entry.key.clone(),
                    error,
                });
                ControlFlow::Break(())
            }
        }
    }
}

/// Decodes and writes one entry.
async fn apply_entry<V: Vault>(
    vault: &V,
    entry: &BufferEntry,
    policy: NewlinePolicy,
) -> Result<(), WriteError> {
    let event = decode_event(&entry.value)?;

    let ignored = event.target.ignored();
    if !ignored.is_empty() {
        warn!(
            key = %entry.key,
            path = %event.target.primary(),
            ignored = ?ignored,
            "Event lists several paths, only the first is written"
        );
    }

    write_event(vault, &event, policy).await
}

/// Applies `batch` in order, stopping at the first failure.
#[instrument(skip(vault, batch), fields(entries = batch.len()))]
pub async fn apply_batch<V: Vault>(
    vault: &V,
    batch: &[BufferEntry],
    policy: NewlinePolicy,
) -> ApplicationOutcome {
    let mut outcome = ApplicationOutcome::default();

    for (index, entry) in batch.iter().enumerate() {
        let result = apply_entry(vault, entry, policy).await;
        if let Err(e) = &result {
            warn!(index, key = %entry.key, error = %e, "Failed to apply event");
        }
        if outcome.record(index, entry, result).is_break() {
            break;
        }
    }

    debug!(
        applied = outcome.applied,
        failed_at = ?outcome.failed_at(),
        "Batch applied"
    );
    outcome
}

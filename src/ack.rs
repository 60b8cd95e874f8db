//! Decides whether a processed batch is acknowledged to the remote buffer.
//!
//! The buffer is drained only when a non-empty batch was applied in full.
//! Anything else leaves the buffer as it is, so the whole batch is delivered
//! again later, including entries that were already written. Duplicated
//! appends are accepted in exchange for never losing an event.

use tracing::{debug, error, info};

use crate::notice::{Notice, NotificationSink};
use crate::sequencer::ApplicationOutcome;
use crate::source::{RemoteSource, SourceError};
use crate::types::{EntryKey, Identity};

/// What was done with the remote buffer after a batch.
#[derive(Debug)]
pub enum DrainDecision {
    /// The batch was empty; nothing to acknowledge.
    Skipped,
    /// The buffer was drained through `through`.
    Drained { applied: usize, through: EntryKey },
    /// Every entry was written but the drain call failed.
    DrainFailed { error: SourceError },
    /// An entry failed, so the buffer was left intact.
    Withheld { failed_at: usize },
}

impl DrainDecision {
    pub fn is_drained(&self) -> bool {
        matches!(self, DrainDecision::Drained { .. })
    }
}

/// Acts on a batch outcome: drains on full success, reports anything else.
///
/// Never fails; every problem becomes a notice.
pub async fn reconcile<R: RemoteSource>(
    source: &R,
    identity: &Identity,
    outcome: ApplicationOutcome,
    sink: &dyn NotificationSink,
) -> DrainDecision {
    if let Some(failure) = outcome.failure {
        error!(
            identity = %identity,
            index = failure.index,
            key = %failure.key,
            applied = outcome.applied,
            "Batch failed, buffer left intact"
        );
        sink.notify(Notice::error(format!(
            "event {} ({}) failed: {}",
            failure.index, failure.key, failure.error
        )));
        return DrainDecision::Withheld {
            failed_at: failure.index,
        };
    }

    let Some(last) = outcome.last else {
        debug!(identity = %identity, "Empty batch, nothing to drain");
        return DrainDecision::Skipped;
    };

    match source.drain(identity, &last).await {
        Ok(()) => {
            info!(
                identity = %identity,
                applied = outcome.applied,
                through = %last.key,
                "Batch applied and drained"
            );
            sink.notify(Notice::Updated {
                identity: identity.clone(),
                applied: outcome.applied,
            });
            DrainDecision::Drained {
                applied: outcome.applied,
                through: last.key,
            }
        }
        Err(e) => {
            error!(identity = %identity, error = %e, "Failed to drain buffer");
            sink.notify(Notice::error(format!(
                "{} events written but the buffer could not be cleared: {e}",
                outcome.applied
            )));
            DrainDecision::DrainFailed { error: e }
        }
    }
}

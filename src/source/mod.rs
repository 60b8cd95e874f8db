//! The remote buffer that note events are delivered from.
//!
//! A [`RemoteSource`] provides two primitives:
//! - `subscribe`: a stream of [`Notification`]s, one per change of the
//!   identity's buffer, each carrying the buffer's full current contents
//! - `drain`: removes everything up to and including a given entry
//!
//! # Settling
//!
//! Each notification carries a [`Receipt`]. The consumer settles it once the
//! batch has been fully handled (applied and, if successful, drained). A
//! source must not look at the buffer again until the receipt is settled or
//! dropped, so it never observes a half-applied batch and never re-delivers
//! entries that are about to be drained.

use std::future::Future;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::spool::SpoolError;
use crate::types::{Batch, BufferEntry, Identity};

pub mod spool;

pub use spool::{SpoolSource, SpoolSourceConfig};

/// Errors reported by a remote source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The subscription could not be established.
    #[error("could not subscribe to buffer for {identity}: {reason}")]
    Subscribe { identity: Identity, reason: String },

    /// The acknowledgment (drain) call failed.
    #[error("could not drain buffer for {identity}: {reason}")]
    DrainFailed { identity: Identity, reason: String },

    /// Buffer storage error.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Completion signal for one notification.
#[derive(Debug, Default)]
pub struct Receipt(Option<oneshot::Sender<()>>);

impl Receipt {
    /// A receipt nobody waits on.
    pub fn detached() -> Self {
        Receipt(None)
    }

    /// A receipt plus the receiver that resolves when it is settled or dropped.
    pub fn pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Receipt(Some(tx)), rx)
    }

    /// Signals that the batch has been fully handled.
    pub fn settle(mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// One "batch available" notification.
#[derive(Debug)]
pub struct Notification {
    /// The buffer's contents, in application order.
    pub batch: Batch,
    /// Settled by the consumer when the batch is handled.
    pub receipt: Receipt,
}

impl Notification {
    /// A notification whose completion nobody waits for.
    pub fn new(batch: Batch) -> Self {
        Notification {
            batch,
            receipt: Receipt::detached(),
        }
    }
}

/// A live subscription to one identity's buffer.
///
/// Cancelling the token ends the source's side of the subscription.
#[derive(Debug)]
pub struct BatchStream {
    pub notifications: mpsc::Receiver<Notification>,
    pub cancel: CancellationToken,
}

/// The remote buffer collaborator.
///
/// # Example (scripted, for tests)
///
/// ```ignore
/// impl RemoteSource for ScriptedSource {
///     fn subscribe(&self, identity: &Identity) -> Result<BatchStream> {
///         let (tx, rx) = mpsc::channel(8);
///         self.senders.lock().unwrap().insert(identity.clone(), tx);
///         Ok(BatchStream { notifications: rx, cancel: CancellationToken::new() })
///     }
///
///     async fn drain(&self, identity: &Identity, last: &BufferEntry) -> Result<()> {
///         self.drains.lock().unwrap().push((identity.clone(), last.clone()));
///         Ok(())
///     }
/// }
/// ```
pub trait RemoteSource: Send + Sync + 'static {
    /// Starts delivering notifications for `identity`'s buffer.
    ///
    /// Must be called from within a tokio runtime.
    fn subscribe(&self, identity: &Identity) -> Result<BatchStream>;

    /// Removes `last` and every entry ordered before it from the buffer.
    fn drain(
        &self,
        identity: &Identity,
        last: &BufferEntry,
    ) -> impl Future<Output = Result<()>> + Send;
}

//! Subscription lifecycle for the "new batch available" notifications.
//!
//! The manager is an explicit state machine:
//!
//! ```text
//!            start(A)                start(B)
//!   Idle ───────────► Subscribed(A) ─────────► Subscribed(B)
//!    ▲                     │                         │
//!    └──────── stop() ─────┴─────────────────────────┘
//! ```
//!
//! Moving to a new identity always cancels the old subscription first. Each
//! subscription runs one task that hands batches to the [`BatchHandler`] one at
//! a time. All subscriptions of a manager share a single processing lane, so a
//! batch still finishing for an old identity is never interleaved with the
//! first batch of the new one.
//!
//! Cancellation is only observed between batches: a batch that has started is
//! always processed to the end.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::notice::{Notice, NotificationSink};
use crate::source::{Notification, RemoteSource, SourceError};
use crate::types::{Batch, Identity};

/// Consumes the batches of a subscription.
pub trait BatchHandler: Send + Sync + 'static {
    /// Processes one batch. Must not fail; problems are reported by the
    /// handler itself.
    fn handle(&self, identity: &Identity, batch: Batch) -> impl Future<Output = ()> + Send;
}

/// The current subscription state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribed(Identity),
}

/// A handle to one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    identity: Identity,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Ends the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Owns at most one live subscription at a time.
pub struct SubscriptionManager<R, H> {
    source: Arc<R>,
    handler: Arc<H>,
    sink: Arc<dyn NotificationSink>,
    /// Held while a batch is processed.
    lane: Arc<tokio::sync::Mutex<()>>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl<R: RemoteSource, H: BatchHandler> SubscriptionManager<R, H> {
    pub fn new(source: Arc<R>, handler: Arc<H>, sink: Arc<dyn NotificationSink>) -> Self {
        SubscriptionManager {
            source,
            handler,
            sink,
            lane: Arc::new(tokio::sync::Mutex::new(())),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        match self.lock_active().as_ref() {
            Some(active) => SubscriptionState::Subscribed(active.handle.identity.clone()),
            None => SubscriptionState::Idle,
        }
    }

    /// Subscribes to `identity`'s buffer, cancelling any prior subscription.
    ///
    /// Must be called from within a tokio runtime. A failure to subscribe is
    /// reported to the notification sink and leaves the manager `Idle`.
    pub fn start(&self, identity: Identity) -> Result<SubscriptionHandle, SourceError> {
        let mut active = self.lock_active();

        if let Some(previous) = active.take() {
            debug!(identity = %previous.handle.identity, "Cancelling previous subscription");
            previous.handle.cancel();
        }

        let stream = match self.source.subscribe(&identity) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to subscribe");
                self.sink.notify(Notice::error(e.to_string()));
                return Err(e);
            }
        };

        let handle = SubscriptionHandle {
            identity: identity.clone(),
            cancel: stream.cancel,
        };

        let task = tokio::spawn(run_subscription(
            identity.clone(),
            stream.notifications,
            handle.cancel.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.lane),
        ));

        info!(identity = %identity, "Subscribed");
        *active = Some(ActiveSubscription {
            handle: handle.clone(),
            task,
        });
        Ok(handle)
    }

    /// Cancels the current subscription, if any.
    ///
    /// Returns the subscription's task, which finishes once any batch in
    /// flight has been processed. Returns `None` when already `Idle`.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let active = self.lock_active().take()?;
        active.handle.cancel();
        info!(identity = %active.handle.identity, "Unsubscribed");
        Some(active.task)
    }

    /// Keeps the subscription in line with the configured identity.
    ///
    /// Subscribes to the identity in `settings` now and whenever it changes,
    /// and goes `Idle` while none is configured. Runs until `shutdown` is
    /// cancelled or the settings channel closes, then stops.
    #[instrument(skip_all)]
    pub async fn follow_identity(
        &self,
        mut settings: watch::Receiver<Settings>,
        shutdown: CancellationToken,
    ) {
        let mut current = settings.borrow_and_update().identity.clone();
        self.switch_to(current.clone());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let next = settings.borrow_and_update().identity.clone();
            if next != current {
                current = next;
                self.switch_to(current.clone());
            }
        }

        if let Some(task) = self.stop() {
            let _ = task.await;
        }
    }

    fn switch_to(&self, identity: Option<Identity>) {
        match identity {
            // Failures were already reported to the sink.
            Some(identity) => {
                let _ = self.start(identity);
            }
            None => {
                self.stop();
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveSubscription>> {
        // The guarded value stays consistent even if a holder panicked.
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Receives notifications until cancelled, handling each batch in turn.
#[instrument(skip_all, fields(identity = %identity))]
async fn run_subscription<H: BatchHandler>(
    identity: Identity,
    mut notifications: mpsc::Receiver<Notification>,
    cancel: CancellationToken,
    handler: Arc<H>,
    lane: Arc<tokio::sync::Mutex<()>>,
) {
    loop {
        let Notification { batch, receipt } = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            notification = notifications.recv() => match notification {
                Some(notification) => notification,
                None => {
                    debug!("Notification stream closed");
                    break;
                }
            },
        };

        let _lane = lane.lock().await;
        debug!(entries = batch.len(), "Handling batch");
        handler.handle(&identity, batch).await;
        receipt.settle();
    }

    debug!("Subscription task finished");
}

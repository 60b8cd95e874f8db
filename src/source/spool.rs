//! A [`RemoteSource`] backed by the on-disk spool.
//!
//! Each subscription runs a watcher task that re-lists the identity's buffer
//! directory on a fixed interval. A notification is sent when the listing
//! changes, and again every `resync_interval` while entries remain, so a batch
//! that failed to apply is retried without waiting for new traffic.
//!
//! The watcher hands over one notification at a time and waits for its
//! [`Receipt`] before listing again.
//!
//! Draining removes only keys that were delivered. An entry can land with a
//! key lower than one already delivered (its write finished late, or the
//! clock stepped back); it stays in the buffer until it is delivered itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{BatchStream, Notification, Receipt, RemoteSource, Result, SourceError};
use crate::spool::{self, SpoolError};
use crate::types::{Batch, BufferEntry, EntryKey, Identity};

/// Default interval between buffer listings (500 ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default interval between re-deliveries of an unchanged, non-empty buffer.
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Configuration for [`SpoolSource`].
#[derive(Debug, Clone)]
pub struct SpoolSourceConfig {
    /// Root of the spool; each identity's buffer is a subdirectory.
    pub spool_dir: PathBuf,

    /// How often the buffer directory is listed.
    pub poll_interval: Duration,

    /// How often an unchanged, non-empty buffer is delivered again.
    pub resync_interval: Duration,
}

impl SpoolSourceConfig {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        SpoolSourceConfig {
            spool_dir: spool_dir.into(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
        }
    }
}

/// Keys of the most recent batch handed to each identity's subscriber.
type DeliveredKeys = Arc<Mutex<HashMap<Identity, Vec<EntryKey>>>>;

/// Delivers spooled entries as batches and drains them on acknowledgment.
#[derive(Debug, Clone)]
pub struct SpoolSource {
    config: SpoolSourceConfig,
    delivered: DeliveredKeys,
}

impl SpoolSource {
    pub fn new(config: SpoolSourceConfig) -> Self {
        SpoolSource {
            config,
            delivered: DeliveredKeys::default(),
        }
    }

    pub fn config(&self) -> &SpoolSourceConfig {
        &self.config
    }

    /// Removes temp files left in any buffer by an interrupted spool write.
    ///
    /// Call once at startup, before the webhook ingress accepts requests.
    pub fn recover(&self) -> std::result::Result<usize, SpoolError> {
        if !self.config.spool_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.config.spool_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                removed += spool::cleanup_temp_files(&path)?;
            }
        }

        if removed > 0 {
            info!(removed, "Removed orphaned spool temp files");
        }
        Ok(removed)
    }
}

impl RemoteSource for SpoolSource {
    fn subscribe(&self, identity: &Identity) -> Result<BatchStream> {
        let buffer = spool::buffer_dir(&self.config.spool_dir, identity)?;
        std::fs::create_dir_all(&buffer).map_err(|e| SourceError::Subscribe {
            identity: identity.clone(),
            reason: e.to_string(),
        })?;

        // Capacity 1: the watcher never runs ahead of the consumer.
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let watcher = BufferWatcher {
            identity: identity.clone(),
            buffer,
            delivered: Arc::clone(&self.delivered),
            poll_interval: self.config.poll_interval,
            resync_interval: self.config.resync_interval,
        };
        tokio::spawn(watcher.run(tx, cancel.clone()));

        Ok(BatchStream {
            notifications: rx,
            cancel,
        })
    }

    async fn drain(&self, identity: &Identity, last: &BufferEntry) -> Result<()> {
        let drain_failed = |reason: String| SourceError::DrainFailed {
            identity: identity.clone(),
            reason,
        };

        let buffer = spool::buffer_dir(&self.config.spool_dir, identity)?;
        let keys = self.take_delivered(identity, &last.key);
        if keys.is_empty() {
            debug!(identity = %identity, through = %last.key, "No delivered entries to drain");
            return Ok(());
        }

        let removed = tokio::task::spawn_blocking(move || spool::drain_entries(&buffer, &keys))
            .await
            .map_err(|e| drain_failed(e.to_string()))?
            .map_err(|e| drain_failed(e.to_string()))?;

        debug!(identity = %identity, through = %last.key, removed, "Drained buffer");
        Ok(())
    }
}

impl SpoolSource {
    /// Takes the delivered keys of `identity` up to and including `through`.
    fn take_delivered(&self, identity: &Identity, through: &EntryKey) -> Vec<EntryKey> {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(keys) = delivered.get_mut(identity) else {
            return Vec::new();
        };
        let (taken, rest): (Vec<EntryKey>, Vec<EntryKey>) =
            keys.drain(..).partition(|key| key <= through);
        *keys = rest;
        taken
    }
}

/// The per-subscription task that turns buffer listings into notifications.
struct BufferWatcher {
    identity: Identity,
    buffer: PathBuf,
    delivered: DeliveredKeys,
    poll_interval: Duration,
    resync_interval: Duration,
}

impl BufferWatcher {
    #[instrument(skip_all, fields(identity = %self.identity))]
    async fn run(self, tx: mpsc::Sender<Notification>, cancel: CancellationToken) {
        debug!("Buffer watcher started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_keys: Option<Vec<EntryKey>> = None;
        let mut last_sent = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = match self.list().await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Failed to list buffer");
                    continue;
                }
            };

            let keys: Vec<EntryKey> = batch.iter().map(|e| e.key.clone()).collect();
            let changed = last_keys.as_ref() != Some(&keys);
            let resync_due = !keys.is_empty() && last_sent.elapsed() >= self.resync_interval;
            if !changed && !resync_due {
                continue;
            }

            debug!(entries = keys.len(), changed, "Delivering buffer");
            self.record_delivered(&keys);

            let (receipt, settled) = Receipt::pair();
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(Notification { batch, receipt }) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
            last_keys = Some(keys);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = settled => {}
            }
            last_sent = Instant::now();
        }

        debug!("Buffer watcher stopped");
    }

    fn record_delivered(&self, keys: &[EntryKey]) {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.identity.clone(), keys.to_vec());
    }

    async fn list(&self) -> std::result::Result<Batch, SpoolError> {
        let buffer = self.buffer.clone();
        tokio::task::spawn_blocking(move || spool::list_pending(&buffer))
            .await
            .map_err(|e| SpoolError::Io(std::io::Error::other(e)))?
    }
}

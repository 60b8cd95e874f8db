//! User-visible notices emitted at the end of each batch cycle.
//!
//! Notices are fire-and-forget: nothing flows back from a sink into batch
//! processing.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::SettingsHandle;
use crate::types::Identity;

/// A user-visible outcome of a batch cycle or a transport problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Every event in a batch was written and the buffer was drained.
    Updated { identity: Identity, applied: usize },
    /// Something failed. `message` includes the underlying error.
    Error { message: String },
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Notice::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Updated { applied, .. } => {
                write!(f, "Notes updated by webhooks ({applied} applied)")
            }
            Notice::Error { message } => write!(f, "Error processing webhook events: {message}"),
        }
    }
}

/// Receives notices.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// A sink that reports notices through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Updated { identity, applied } => {
                info!(identity = %identity, applied = applied, "{notice}");
            }
            Notice::Error { .. } => error!("{notice}"),
        }
    }
}

/// Forwards notices and keeps the latest error in the settings.
///
/// An error notice stores its message in `Settings::error`; an `Updated`
/// notice clears it. Settings are saved by a background task, in notice order.
pub struct SettingsErrorSink {
    inner: Arc<dyn NotificationSink>,
    errors: mpsc::UnboundedSender<Option<String>>,
}

impl SettingsErrorSink {
    /// Must be called from within a tokio runtime.
    pub fn spawn(inner: Arc<dyn NotificationSink>, settings: SettingsHandle) -> Self {
        let (errors, mut rx) = mpsc::unbounded_channel::<Option<String>>();

        tokio::spawn(async move {
            while let Some(error) = rx.recv().await {
                if settings.current().error == error {
                    continue;
                }
                if let Err(e) = settings.modify(move |s| s.error = error).await {
                    warn!(error = %e, "Failed to record last error in settings");
                }
            }
        });

        SettingsErrorSink { inner, errors }
    }
}

impl NotificationSink for SettingsErrorSink {
    fn notify(&self, notice: Notice) {
        let error = match &notice {
            Notice::Error { message } => Some(message.clone()),
            Notice::Updated { .. } => None,
        };
        self.inner.notify(notice);
        // Closed only once the runtime is shutting down.
        let _ = self.errors.send(error);
    }
}

//! User settings: persisted as JSON and published live to running tasks.
//!
//! The settings file is replaced atomically on every update. After a
//! successful save the new value is published on a `watch` channel; batch
//! processing takes one snapshot per batch, so an update never changes the
//! newline policy halfway through a batch.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::persistence::write_atomic;
use crate::types::{Identity, NewlinePolicy};

/// Errors from loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// User-facing settings.
///
/// Missing fields take their defaults, so older settings files keep loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Line terminator placed between and after applied notes.
    pub newline: NewlinePolicy,

    /// Whose buffer to follow. `None` means no subscription.
    pub identity: Option<Identity>,

    /// Last error shown to the user, if any.
    pub error: Option<String>,
}

/// The settings file on disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the settings, or the defaults when no file exists yet.
    pub fn load(&self) -> Result<Settings> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Saves `settings`, replacing the file atomically.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

/// Shared access to the live settings.
///
/// Cloning is cheap; all clones publish to the same channel.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<SettingsInner>,
}

#[derive(Debug)]
struct SettingsInner {
    store: SettingsStore,
    tx: watch::Sender<Settings>,
    /// Serializes updates so the file and the channel agree.
    update_lock: Mutex<()>,
}

impl SettingsHandle {
    /// Loads the stored settings and starts publishing them.
    pub fn load(store: SettingsStore) -> Result<Self> {
        let settings = store.load()?;
        info!(
            path = %store.path().display(),
            newline = ?settings.newline,
            identity = ?settings.identity,
            "Loaded settings"
        );
        Ok(Self::with_initial(store, settings))
    }

    /// Starts publishing `settings` without reading the store.
    pub fn with_initial(store: SettingsStore, settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        SettingsHandle {
            inner: Arc::new(SettingsInner {
                store,
                tx,
                update_lock: Mutex::new(()),
            }),
        }
    }

    /// A snapshot of the current settings.
    pub fn current(&self) -> Settings {
        self.inner.tx.borrow().clone()
    }

    /// A receiver that observes every published update.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.inner.tx.subscribe()
    }

    /// Persists `settings`, then publishes them.
    ///
    /// Nothing is published when saving fails.
    pub async fn update(&self, settings: Settings) -> Result<Settings> {
        let _guard = self.inner.update_lock.lock().await;
        self.save_and_publish(settings).await
    }

    /// Applies `change` to the current settings, then persists and publishes
    /// the result.
    pub async fn modify(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let _guard = self.inner.update_lock.lock().await;
        let mut settings = self.current();
        change(&mut settings);
        self.save_and_publish(settings).await
    }

    async fn save_and_publish(&self, settings: Settings) -> Result<Settings> {
        let store = self.inner.store.clone();
        let to_save = settings.clone();
        tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .map_err(|e| SettingsError::Io(io::Error::other(e)))??;

        self.inner.tx.send_replace(settings.clone());
        info!(
            newline = ?settings.newline,
            identity = ?settings.identity,
            error = ?settings.error,
            "Settings updated"
        );
        Ok(settings)
    }
}

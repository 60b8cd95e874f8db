//! HTTP server for note ingress and settings.
//!
//! # Endpoints
//!
//! - `POST /webhook/{identity}` - Accepts a signed note event and spools it (202 Accepted)
//! - `GET /api/v1/settings` - Returns the current settings as JSON
//! - `PUT /api/v1/settings` - Replaces the settings
//! - `GET /health` - Returns 200 if the server is running

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SettingsHandle;

pub mod health;
pub mod settings;
pub mod webhook;

pub use health::health_handler;
pub use settings::{SettingsApiError, get_settings, put_settings};
pub use webhook::{WebhookError, webhook_handler};

/// Shared application state, passed to handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Root of the per-identity buffers.
    spool_dir: PathBuf,

    /// Secret for verifying webhook signatures.
    webhook_secret: Vec<u8>,

    settings: SettingsHandle,
}

impl AppState {
    pub fn new(
        spool_dir: impl Into<PathBuf>,
        webhook_secret: impl Into<Vec<u8>>,
        settings: SettingsHandle,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                spool_dir: spool_dir.into(),
                webhook_secret: webhook_secret.into(),
                settings,
            }),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.inner.spool_dir
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.inner.settings
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook/{identity}", post(webhook_handler))
        .route("/api/v1/settings", get(get_settings).put(put_settings))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

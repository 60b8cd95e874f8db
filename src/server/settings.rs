//! Settings endpoint: read and replace the user settings.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use super::AppState;
use crate::config::{Settings, SettingsError};

/// Errors from the settings endpoint.
#[derive(Debug, Error)]
pub enum SettingsApiError {
    #[error("could not save settings: {0}")]
    Save(#[from] SettingsError),
}

impl IntoResponse for SettingsApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// `GET /api/v1/settings`: the current settings as JSON.
pub async fn get_settings(State(app_state): State<AppState>) -> Json<Settings> {
    Json(app_state.settings().current())
}

/// `PUT /api/v1/settings`: replaces the settings.
///
/// The new settings are saved before they are published, and take effect
/// from the next batch. Returns the stored settings.
pub async fn put_settings(
    State(app_state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, SettingsApiError> {
    let updated = app_state
        .settings()
        .update(settings)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to save settings"))?;
    Ok(Json(updated))
}

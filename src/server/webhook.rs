//! Webhook ingress for note events.
//!
//! A delivery is verified, checked for the event shape and a writable path,
//! and spooled into the identity's buffer before `202 Accepted` is returned.
//! An entry the writer would always reject is refused here, since it would
//! otherwise stay at the head of the buffer and block every later event. Application to the
//! vault happens later, when the buffer watcher delivers the entry.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::sequencer::decode_event;
use crate::spool::{self, SpoolError};
use crate::types::Identity;
use crate::webhooks::{SIGNATURE_HEADER, verify_signature};
use crate::writer::{WriteError, normalize_path};

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid note event: {0}")]
    InvalidEvent(#[from] WriteError),

    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::InvalidJson(_)
            | WebhookError::InvalidEvent(_)
            | WebhookError::Spool(SpoolError::InvalidIdentity(_)) => StatusCode::BAD_REQUEST,
            WebhookError::Spool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// Accepts one note event for `identity`.
///
/// # Request
///
/// - Method: POST `/webhook/{identity}`
/// - Header `X-Notesync-Signature-256: sha256=<hex>`, the HMAC-SHA256 of the body
/// - Body: `{"data": "<text>", "path": "<path>" | ["<path>", ...]}`
///
/// # Response
///
/// - 202 Accepted: event spooled
/// - 400 Bad Request: invalid identity, JSON, event shape or target path
/// - 401 Unauthorized: missing or invalid signature
/// - 500 Internal Server Error: spool failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    Path(identity): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let identity = Identity::new(identity);

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if !verify_signature(&body, signature, app_state.webhook_secret()) {
        warn!(identity = %identity, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let buffer = spool::buffer_dir(app_state.spool_dir(), &identity)?;

    let value: serde_json::Value = serde_json::from_slice(&body)?;
    let event = decode_event(&value)?;
    let path = normalize_path(event.target.primary())?;
    debug!(identity = %identity, path = %path, "Received note event");

    let key = spool::next_entry_key();
    let spooled_key = key.clone();
    tokio::task::spawn_blocking(move || spool::spool_entry(&buffer, &spooled_key, &value))
        .await
        .map_err(|e| SpoolError::Io(std::io::Error::other(e)))?
        .inspect_err(|e| warn!(identity = %identity, error = %e, "Failed to spool event"))?;

    info!(identity = %identity, key = %key, "Note event spooled");
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

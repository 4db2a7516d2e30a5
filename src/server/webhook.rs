//! Webhook endpoint handler.
//!
//! Accepts GitLab webhook deliveries, checks the shared token, and queues
//! commands found in issue notes. Commands run asynchronously in the
//! dispatcher, so the response never waits on git or the GitLab API.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use super::dispatch::CommandJob;
use crate::commands::{CommandError, parse_command};
use crate::gitlab::{EventError, parse_note_event};

type HmacSha256 = Hmac<Sha256>;

/// Header name for the GitLab event type.
const HEADER_EVENT: &str = "x-gitlab-event";
/// Header name for the shared secret token.
const HEADER_TOKEN: &str = "x-gitlab-token";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Missing or wrong `X-Gitlab-Token`.
    #[error("invalid token")]
    InvalidToken,

    /// The note payload does not parse.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] EventError),

    /// The dispatcher has shut down.
    #[error("not accepting commands")]
    Unavailable,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidToken => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-Gitlab-Event`: Event type (e.g. "Note Hook")
///   - `X-Gitlab-Token`: Shared secret, required when one is configured
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: Command queued, or delivery ignored (other events, notes on
///   merge requests, notes by bots, notes that are not commands)
/// - 400 Bad Request: Missing header or malformed note payload
/// - 401 Unauthorized: Token missing or wrong
/// - 503 Service Unavailable: Dispatcher stopped
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    // Check the token BEFORE any parsing.
    if let Some(secret) = app_state.webhook_secret() {
        let token = headers
            .get(HEADER_TOKEN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_token(token, secret) {
            warn!("invalid webhook token");
            return Err(WebhookError::InvalidToken);
        }
    }

    let event_type = get_header(&headers, HEADER_EVENT)?;
    debug!(event_type = %event_type, "received webhook");

    let Some(event) = parse_note_event(&event_type, &body)? else {
        debug!(event_type = %event_type, "ignoring event");
        return Ok((StatusCode::OK, "Ignored"));
    };

    if event.user.bot {
        debug!(user = %event.user.username, "ignoring note from bot");
        return Ok((StatusCode::OK, "Ignored"));
    }

    let command = match parse_command(&event.note) {
        Ok(command) => command,
        Err(CommandError::NotACommand) => return Ok((StatusCode::OK, "Ignored")),
        Err(e) => {
            warn!(
                project_id = %event.project_id,
                issue = %event.issue_iid,
                error = %e,
                "invalid command"
            );
            return Ok((StatusCode::OK, "Ignored"));
        }
    };

    info!(
        project_id = %event.project_id,
        issue = %event.issue_iid,
        user = %event.user.username,
        command = %command,
        "queueing command"
    );

    if !app_state.submit(CommandJob { command, event }) {
        return Err(WebhookError::Unavailable);
    }
    Ok((StatusCode::OK, "Accepted"))
}

/// Compares `provided` with `secret` in constant time.
///
/// Both sides are run through HMAC-SHA256 keyed with the secret, so the
/// comparison neither leaks the secret's length nor short-circuits.
pub fn verify_token(provided: &str, secret: &[u8]) -> bool {
    let Ok(mut expected) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    expected.update(secret);
    let expected = expected.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(provided.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}

//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;

/// Returns 200 "OK" while the dispatcher is accepting commands, 503 after it
/// has stopped.
pub async fn health_handler(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    if app_state.is_accepting() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "dispatcher stopped")
    }
}

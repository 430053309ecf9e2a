use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Liveness: database reachable and, when wired, the stream connected.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.repo.ping().await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "error": "database unreachable"})),
        );
    }

    if let Some(nats) = &state.nats {
        if nats.connection_state() != async_nats::connection::State::Connected {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "error", "error": "NATS disconnected"})),
            );
        }
    }

    (StatusCode::OK, Json(json!({"status": "ok"})))
}

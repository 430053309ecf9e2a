//! HTTP API: read-only queries over the ledger plus the import endpoint.

pub mod accounts;
pub mod health;
pub mod import;
pub mod orders;
pub mod positions;
pub mod trades;

use crate::db::Repository;
use crate::import::ImportService;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub import: Arc<ImportService>,
    /// Present when the stream consumer is wired; health reports on it.
    pub nats: Option<async_nats::Client>,
}

pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/import", post(import::import_trades))
        .route("/accounts", get(accounts::list_accounts))
        .route(
            "/accounts/{account_id}/portfolio",
            get(accounts::get_portfolio),
        )
        .route(
            "/accounts/{account_id}/positions",
            get(positions::list_positions),
        )
        .route("/accounts/{account_id}/trades", get(trades::list_trades))
        .route("/accounts/{account_id}/orders", get(orders::list_orders));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_v1)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"error": "Method Not Allowed"})),
    )
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(300))
}

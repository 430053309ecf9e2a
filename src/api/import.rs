use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::import::ImportSummary;
use crate::ingest::TradeEvent;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub trades: Vec<TradeEvent>,
}

/// POST /api/v1/import: batch historic-trade ingress.
///
/// 200 on any success or all-duplicate, 422 when every attempted insert
/// failed, 400 for structural problems before processing starts.
pub async fn import_trades(
    State(state): State<AppState>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ImportSummary>), AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::BadRequest(format!("invalid JSON: {}", e.body_text())))?;

    let summary = state.import.import(request.trades).await?;

    let status = if summary.errors > 0 && summary.inserted == 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

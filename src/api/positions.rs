use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use super::AppState;
use crate::db::repo::PositionStatusFilter;
use crate::domain::Position;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub status: Option<String>,
}

pub async fn list_positions(
    Path(account_id): Path<String>,
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Position>>, AppError> {
    let status = match params.status.as_deref() {
        None => PositionStatusFilter::Open,
        Some(raw) => PositionStatusFilter::from_str(raw).map_err(AppError::BadRequest)?,
    };

    let positions = state.repo.list_positions(&account_id, status).await?;
    Ok(Json(positions))
}

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use super::trades::{parse_cursor, parse_limit};
use super::AppState;
use crate::db::repo::{OrderFilter, OrderListResult};
use crate::domain::OrderStatus;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub symbol: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

pub async fn list_orders(
    Path(account_id): Path<String>,
    Query(params): Query<OrdersQuery>,
    State(state): State<AppState>,
) -> Result<Json<OrderListResult>, AppError> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(OrderStatus::from_str(raw).map_err(AppError::BadRequest)?),
    };

    let filter = OrderFilter {
        status,
        symbol: params.symbol,
        cursor: parse_cursor(params.cursor.as_deref())?,
        limit: parse_limit(params.limit.as_deref())?,
    };

    let result = state.repo.list_orders(&account_id, &filter).await?;
    Ok(Json(result))
}

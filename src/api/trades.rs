use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;

use super::AppState;
use crate::db::repo::{Cursor, TradeFilter, TradeListResult};
use crate::domain::{MarketType, Side};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub market_type: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

pub async fn list_trades(
    Path(account_id): Path<String>,
    Query(params): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradeListResult>, AppError> {
    let filter = TradeFilter {
        symbol: params.symbol,
        side: parse_opt(params.side.as_deref(), Side::from_str)?,
        market_type: parse_opt(params.market_type.as_deref(), MarketType::from_str)?,
        start: parse_time(params.start.as_deref(), "invalid start time")?,
        end: parse_time(params.end.as_deref(), "invalid end time")?,
        cursor: parse_cursor(params.cursor.as_deref())?,
        limit: parse_limit(params.limit.as_deref())?,
    };

    let result = state.repo.list_trades(&account_id, &filter).await?;
    Ok(Json(result))
}

fn parse_opt<T>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<Option<T>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => parse(s).map(Some).map_err(AppError::BadRequest),
    }
}

pub(super) fn parse_time(
    raw: Option<&str>,
    message: &str,
) -> Result<Option<DateTime<Utc>>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| AppError::BadRequest(message.to_string())),
    }
}

pub(super) fn parse_cursor(raw: Option<&str>) -> Result<Option<Cursor>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => Cursor::decode(s)
            .map(Some)
            .map_err(|_| AppError::BadRequest("invalid cursor".to_string())),
    }
}

pub(super) fn parse_limit(raw: Option<&str>) -> Result<Option<i64>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::BadRequest("invalid limit".to_string())),
    }
}

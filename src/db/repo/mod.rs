//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all ledger persistence.
//! Methods are organized across submodules by domain:
//! - `accounts.rs` - account lookup and idempotent creation
//! - `trades.rs`   - trade-log inserts and paginated listing
//! - `positions.rs`- position upserts, rebuild, portfolio summary
//! - `orders.rs`   - order upsert and paginated listing

mod accounts;
mod orders;
mod positions;
mod trades;

pub use orders::{OrderFilter, OrderListResult};
pub use positions::{PortfolioSummary, PositionStatusFilter};
pub use trades::{TradeFilter, TradeListResult};

use crate::domain::Decimal;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Repository for database operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check the database connection.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool, waiting for in-flight operations.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Keyset-pagination cursor over (timestamp, id), opaque on the wire.
///
/// Encoded as URL-safe base64 of `"<rfc3339nano>|<id>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp_ms: i64,
    pub id: String,
}

/// Error decoding a client-supplied cursor.
#[derive(Debug, Error)]
#[error("invalid cursor")]
pub struct CursorError;

impl Cursor {
    pub fn new(timestamp_ms: i64, id: impl Into<String>) -> Self {
        Cursor {
            timestamp_ms,
            id: id.into(),
        }
    }

    pub fn encode(&self) -> String {
        let ts = datetime_from_ms(self.timestamp_ms).to_rfc3339_opts(SecondsFormat::Nanos, true);
        URL_SAFE.encode(format!("{}|{}", ts, self.id))
    }

    pub fn decode(cursor: &str) -> Result<Self, CursorError> {
        let raw = URL_SAFE.decode(cursor).map_err(|_| CursorError)?;
        let raw = String::from_utf8(raw).map_err(|_| CursorError)?;
        let (ts, id) = raw.split_once('|').ok_or(CursorError)?;
        let ts = DateTime::parse_from_rfc3339(ts).map_err(|_| CursorError)?;
        Ok(Cursor {
            timestamp_ms: ts.timestamp_millis(),
            id: id.to_string(),
        })
    }
}

/// Clamp a client-supplied page size to [1, 200], defaulting to 50.
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 200 => 200,
        Some(l) if l > 0 => l,
        _ => 50,
    }
}

pub(crate) fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Parse a persisted canonical decimal, defaulting (with a warning) on
/// corruption rather than failing the whole read.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "failed to parse stored decimal, using default");
        Decimal::default()
    })
}

pub(crate) fn optional_decimal_column(row: &SqliteRow, column: &str) -> Option<Decimal> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| {
        Decimal::from_str(&s)
            .map_err(|e| {
                warn!(column, value = %s, error = %e, "failed to parse stored decimal, dropping");
                e
            })
            .ok()
    })
}

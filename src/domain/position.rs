//! Position record: the materialized accumulation of one symbol in one
//! account and one market.

use crate::domain::{Decimal, MarketType, PositionSide, PositionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked position.
///
/// At most one open row exists per (account_id, symbol, market_type); closed
/// rows are retained for audit with quantity 0 and `closed_at` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub market_type: MarketType,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Decimal>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

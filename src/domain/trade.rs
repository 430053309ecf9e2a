//! Trade record: a single execution event, immutable once inserted.

use crate::domain::{Decimal, MarketType, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single trade execution.
///
/// `cost_basis` and `realized_pnl` on the trade row are record-keeping
/// snapshots stamped at ingest time; position state is derived separately by
/// the engine, which recomputes P&L from its own state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub fee_currency: String,
    pub market_type: MarketType,
    /// Event time reported by the upstream bot.
    pub timestamp: DateTime<Utc>,
    /// Wall time at insert.
    pub ingested_at: DateTime<Utc>,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,

    // Futures-specific fields (absent on spot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_fee: Option<Decimal>,
}

impl Trade {
    /// Stamp `cost_basis` and `realized_pnl` on the trade row.
    ///
    /// Buys carry their own acquisition cost; sells are valued against the
    /// open position's average entry price at ingest time.
    pub fn stamp_economics(&mut self, avg_entry_price: Decimal) {
        match self.side {
            Side::Buy => {
                self.cost_basis = self.quantity * self.price + self.fee;
                self.realized_pnl = Decimal::zero();
            }
            Side::Sell => {
                self.cost_basis = avg_entry_price * self.quantity;
                self.realized_pnl =
                    (self.price - avg_entry_price) * self.quantity - self.fee;
            }
        }
    }
}

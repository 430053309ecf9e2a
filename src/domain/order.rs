//! Order record, tracked alongside the trade log.

use crate::domain::{Decimal, MarketType, OrderStatus, OrderType, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trading order. Unlike trades, orders are mutable: fills and status
/// changes upsert over the same `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub requested_qty: Decimal,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub status: OrderStatus,
    pub market_type: MarketType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

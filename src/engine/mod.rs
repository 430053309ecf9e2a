//! Pure position engine.
//!
//! Maps (current position, incoming trade) to the next position state plus
//! realized P&L, with no side effects. The repository invokes it inside the
//! same transaction that inserts the trade; rebuilds replay the trade log
//! through the same function, so incremental and replayed state agree.

mod futures_market;
mod spot;

use crate::domain::{MarketType, Position, Trade};

/// Outcome of applying one trade to the current position state.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    /// No position change; the trade is still recorded in the log.
    /// Happens for a spot sell with nothing open.
    Ignore,
    /// Write this row as the position for the trade's key.
    Write(Position),
}

/// Apply a trade to the current open position (if any) for its
/// (account, symbol, market_type) key.
///
/// Total and deterministic: equal inputs produce equal outputs. Callers
/// resolve ordering ties on equal timestamps by `trade_id` ascending.
pub fn apply(current: Option<&Position>, trade: &Trade) -> PositionAction {
    match trade.market_type {
        MarketType::Spot => spot::apply(current, trade),
        MarketType::Futures => futures_market::apply(current, trade),
    }
}

/// Deterministic id for a position opened by `trade`.
///
/// Derived from the opening trade so a rebuild reproduces identical rows,
/// and unique because trade ids are.
pub(crate) fn position_id(trade: &Trade) -> String {
    format!(
        "{}-{}-{}-{}",
        trade.account_id, trade.symbol, trade.market_type, trade.trade_id
    )
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::domain::{Decimal, MarketType, Side, Trade};
    use chrono::{DateTime, TimeZone, Utc};

    pub fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, minute, 0).unwrap()
    }

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    pub fn spot_trade(id: &str, side: Side, qty: &str, price: &str, fee: &str, minute: u32) -> Trade {
        Trade {
            trade_id: id.to_string(),
            account_id: "live".to_string(),
            symbol: "BTC-USD".to_string(),
            side,
            quantity: dec(qty),
            price: dec(price),
            fee: dec(fee),
            fee_currency: "USD".to_string(),
            market_type: MarketType::Spot,
            timestamp: ts(minute),
            ingested_at: ts(minute),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            leverage: None,
            margin: None,
            liquidation_price: None,
            funding_fee: None,
        }
    }

    pub fn futures_trade(
        id: &str,
        side: Side,
        qty: &str,
        price: &str,
        fee: &str,
        minute: u32,
    ) -> Trade {
        Trade {
            market_type: MarketType::Futures,
            ..spot_trade(id, side, qty, price, fee, minute)
        }
    }
}

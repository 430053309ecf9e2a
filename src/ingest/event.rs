//! Wire format for trade events received from the stream and the import API.

use crate::domain::{Decimal, MarketType, Side, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// JSON trade event as published by the upstream bot.
///
/// `side`, `market_type` and `timestamp` stay raw strings here; validation
/// turns them into domain types so a malformed payload is reported instead
/// of silently coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(default)]
    pub trade_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub fee_currency: String,
    #[serde(default)]
    pub market_type: String,
    #[serde(default)]
    pub timestamp: String,

    // Futures-specific fields (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_fee: Option<Decimal>,
}

/// Why an event failed validation.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl TradeEvent {
    /// Check required fields and value ranges.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.trade_id.is_empty() {
            return Err(EventError::MissingField("trade_id"));
        }
        if self.account_id.is_empty() {
            return Err(EventError::MissingField("account_id"));
        }
        if self.symbol.is_empty() {
            return Err(EventError::MissingField("symbol"));
        }
        Side::from_str(&self.side).map_err(|reason| EventError::InvalidField {
            field: "side",
            reason,
        })?;
        if !self.quantity.is_positive() {
            return Err(EventError::InvalidField {
                field: "quantity",
                reason: format!("must be positive, got {}", self.quantity),
            });
        }
        if !self.price.is_positive() {
            return Err(EventError::InvalidField {
                field: "price",
                reason: format!("must be positive, got {}", self.price),
            });
        }
        if self.fee_currency.is_empty() {
            return Err(EventError::MissingField("fee_currency"));
        }
        if self.timestamp.is_empty() {
            return Err(EventError::MissingField("timestamp"));
        }
        MarketType::from_str(&self.market_type).map_err(|reason| EventError::InvalidField {
            field: "market_type",
            reason,
        })?;
        self.event_time()?;
        Ok(())
    }

    /// The parsed event timestamp.
    pub fn event_time(&self) -> Result<DateTime<Utc>, EventError> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| EventError::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            })
    }

    /// Convert into a domain trade, stamping buy-side cost basis.
    ///
    /// Sell-side economics need the open position's entry price and are
    /// stamped by the caller before insert.
    pub fn into_trade(self) -> Result<Trade, EventError> {
        let timestamp = self.event_time()?;
        let side = Side::from_str(&self.side).map_err(|reason| EventError::InvalidField {
            field: "side",
            reason,
        })?;
        let market_type =
            MarketType::from_str(&self.market_type).map_err(|reason| EventError::InvalidField {
                field: "market_type",
                reason,
            })?;

        let mut trade = Trade {
            trade_id: self.trade_id,
            account_id: self.account_id,
            symbol: self.symbol,
            side,
            quantity: self.quantity,
            price: self.price,
            fee: self.fee,
            fee_currency: self.fee_currency,
            market_type,
            timestamp,
            ingested_at: Utc::now(),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            leverage: self.leverage,
            margin: self.margin,
            liquidation_price: self.liquidation_price,
            funding_fee: self.funding_fee,
        };
        if side == Side::Buy {
            trade.stamp_economics(Decimal::zero());
        }
        Ok(trade)
    }
}

//! Domain types for the trading ledger.
//!
//! This module provides:
//! - Lossless money/quantity arithmetic via the Decimal wrapper
//! - Core enums: Side, MarketType, PositionSide, PositionStatus, AccountType
//! - The four ledger records: Account, Trade, Position, Order

pub mod account;
pub mod decimal;
pub mod order;
pub mod position;
pub mod primitives;
pub mod trade;

pub use account::Account;
pub use decimal::Decimal;
pub use order::Order;
pub use position::Position;
pub use primitives::{
    AccountType, MarketType, OrderStatus, OrderType, PositionSide, PositionStatus, Side,
};
pub use trade::Trade;

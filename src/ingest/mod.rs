//! Durable stream ingestion of trade events.
//!
//! This module provides:
//! - The wire `TradeEvent` type with validation and domain conversion
//! - The JetStream consumer mapping handler outcomes to ack/nak/term

pub mod consumer;
pub mod event;

pub use consumer::{connect, handle_event, Consumer, EventOutcome};
pub use event::TradeEvent;

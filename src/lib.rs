pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod import;
pub mod ingest;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Account, AccountType, Decimal, MarketType, Order, Position, PositionSide, PositionStatus,
    Side, Trade,
};
pub use error::AppError;
pub use import::ImportService;

//! Batch historic-trade import.
//!
//! Backfill batches may interleave with trades already ingested from the
//! stream, so after inserting, every affected account's positions are
//! rebuilt from the log to restore canonical state.

use crate::db::Repository;
use crate::domain::{AccountType, Side, Trade};
use crate::ingest::event::{EventError, TradeEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Maximum number of trades accepted in one batch.
pub const MAX_BATCH: usize = 1000;

/// Per-trade outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Inserted,
    Duplicate,
    Error,
}

/// Per-trade import outcome.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub trade_id: String,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch import summary.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub results: Vec<ImportResult>,
}

impl ImportSummary {
    fn record(&mut self, trade_id: String, status: ImportStatus, error: Option<String>) {
        match status {
            ImportStatus::Inserted => self.inserted += 1,
            ImportStatus::Duplicate => self.duplicates += 1,
            ImportStatus::Error => self.errors += 1,
        }
        self.results.push(ImportResult {
            trade_id,
            status,
            error,
        });
    }
}

/// Structural failures that reject the whole batch before processing.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("trades array is empty")]
    EmptyBatch,
    #[error("too many trades: max {MAX_BATCH} per request")]
    BatchTooLarge,
    #[error("trade[{index}] ({trade_id}): {source}")]
    InvalidEvent {
        index: usize,
        trade_id: String,
        source: EventError,
    },
}

/// Batch historic-trade ingress.
pub struct ImportService {
    repo: Arc<Repository>,
}

impl ImportService {
    pub fn new(repo: Arc<Repository>) -> Self {
        ImportService { repo }
    }

    /// Import a batch of trade events.
    ///
    /// The whole batch is validated before anything is written; processing
    /// then runs in event-time order and collects a per-trade outcome
    /// instead of failing fast.
    ///
    /// # Errors
    /// Returns `ImportError` only for structural failures (empty, oversized,
    /// or invalid events); storage failures surface per trade in the
    /// summary.
    pub async fn import(&self, mut events: Vec<TradeEvent>) -> Result<ImportSummary, ImportError> {
        if events.is_empty() {
            return Err(ImportError::EmptyBatch);
        }
        if events.len() > MAX_BATCH {
            return Err(ImportError::BatchTooLarge);
        }
        for (index, event) in events.iter().enumerate() {
            event
                .validate()
                .map_err(|source| ImportError::InvalidEvent {
                    index,
                    trade_id: event.trade_id.clone(),
                    source,
                })?;
        }

        // Stable sort: equal timestamps keep their submitted order.
        events.sort_by_key(|e| e.event_time().map(|t| t.timestamp_millis()).unwrap_or(0));

        let mut summary = ImportSummary {
            total: events.len(),
            inserted: 0,
            duplicates: 0,
            errors: 0,
            results: Vec::with_capacity(events.len()),
        };
        let mut affected_accounts = BTreeSet::new();

        for event in events {
            let trade_id = event.trade_id.clone();
            let trade = match event.into_trade() {
                Ok(trade) => trade,
                Err(e) => {
                    summary.record(trade_id, ImportStatus::Error, Some(e.to_string()));
                    continue;
                }
            };
            let account_id = trade.account_id.clone();

            match self.import_one(trade).await {
                Ok(true) => {
                    affected_accounts.insert(account_id);
                    summary.record(trade_id, ImportStatus::Inserted, None);
                }
                Ok(false) => summary.record(trade_id, ImportStatus::Duplicate, None),
                Err(e) => summary.record(trade_id, ImportStatus::Error, Some(e.to_string())),
            }
        }

        // Accounts with new rows may have received out-of-chronology
        // history; replaying the log restores canonical position state.
        for account_id in &affected_accounts {
            if let Err(e) = self.repo.rebuild_positions(account_id).await {
                error!(account_id = %account_id, error = %e, "failed to rebuild positions after import");
            }
        }

        info!(
            total = summary.total,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            errors = summary.errors,
            "import batch processed"
        );
        Ok(summary)
    }

    async fn import_one(&self, mut trade: Trade) -> Result<bool, sqlx::Error> {
        self.repo
            .get_or_create_account(&trade.account_id, AccountType::infer(&trade.account_id))
            .await?;

        if trade.side == Side::Sell {
            let avg_entry = self
                .repo
                .get_avg_entry_price(&trade.account_id, &trade.symbol, trade.market_type)
                .await?;
            trade.stamp_economics(avg_entry);
        }

        self.repo.insert_trade_and_update_position(&trade).await
    }
}

//! Trade-log operations for the repository.

use crate::domain::{MarketType, Side, Trade};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;

use super::{
    clamp_limit, datetime_from_ms, decimal_column, optional_decimal_column, Cursor, Repository,
};

/// Filters for listing trades.
#[derive(Debug, Default, Clone)]
pub struct TradeFilter {
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub market_type: Option<MarketType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub cursor: Option<Cursor>,
    pub limit: Option<i64>,
}

/// One page of trades.
#[derive(Debug, Serialize)]
pub struct TradeListResult {
    pub trades: Vec<Trade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl Repository {
    /// Insert a trade into the log idempotently. Returns whether a new row
    /// was written; a duplicate `trade_id` is a no-op, never an error.
    ///
    /// Runs on the caller's connection so it can share a transaction with
    /// the position upsert.
    pub async fn insert_trade(
        &self,
        conn: &mut SqliteConnection,
        trade: &Trade,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                trade_id, account_id, symbol, side, quantity, price, fee, fee_currency,
                market_type, timestamp_ms, ingested_at_ms, cost_basis, realized_pnl,
                leverage, margin, liquidation_price, funding_fee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(trade_id) DO NOTHING
            "#,
        )
        .bind(&trade.trade_id)
        .bind(&trade.account_id)
        .bind(&trade.symbol)
        .bind(trade.side.to_string())
        .bind(trade.quantity.to_canonical_string())
        .bind(trade.price.to_canonical_string())
        .bind(trade.fee.to_canonical_string())
        .bind(&trade.fee_currency)
        .bind(trade.market_type.to_string())
        .bind(trade.timestamp.timestamp_millis())
        .bind(trade.ingested_at.timestamp_millis())
        .bind(trade.cost_basis.to_canonical_string())
        .bind(trade.realized_pnl.to_canonical_string())
        .bind(trade.leverage)
        .bind(trade.margin.map(|d| d.to_canonical_string()))
        .bind(trade.liquidation_price.map(|d| d.to_canonical_string()))
        .bind(trade.funding_fee.map(|d| d.to_canonical_string()))
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All trades for an account in replay order (timestamp, then trade_id).
    pub(crate) async fn trades_for_rebuild(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> Result<Vec<Trade>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, account_id, symbol, side, quantity, price, fee, fee_currency,
                   market_type, timestamp_ms, ingested_at_ms, cost_basis, realized_pnl,
                   leverage, margin, liquidation_price, funding_fee
            FROM trades
            WHERE account_id = ?
            ORDER BY timestamp_ms ASC, trade_id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.iter().map(trade_from_row).collect())
    }

    /// List trades for an account with filters and keyset pagination,
    /// newest first.
    pub async fn list_trades(
        &self,
        account_id: &str,
        filter: &TradeFilter,
    ) -> Result<TradeListResult, sqlx::Error> {
        let limit = clamp_limit(filter.limit);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT trade_id, account_id, symbol, side, quantity, price, fee, fee_currency,
                   market_type, timestamp_ms, ingested_at_ms, cost_basis, realized_pnl,
                   leverage, margin, liquidation_price, funding_fee
            FROM trades
            WHERE account_id = "#,
        );
        builder.push_bind(account_id);

        if let Some(symbol) = &filter.symbol {
            builder.push(" AND symbol = ").push_bind(symbol);
        }
        if let Some(side) = filter.side {
            builder.push(" AND side = ").push_bind(side.to_string());
        }
        if let Some(market_type) = filter.market_type {
            builder
                .push(" AND market_type = ")
                .push_bind(market_type.to_string());
        }
        if let Some(start) = filter.start {
            builder
                .push(" AND timestamp_ms >= ")
                .push_bind(start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            builder
                .push(" AND timestamp_ms <= ")
                .push_bind(end.timestamp_millis());
        }
        if let Some(cursor) = &filter.cursor {
            builder
                .push(" AND (timestamp_ms, trade_id) < (")
                .push_bind(cursor.timestamp_ms)
                .push(", ")
                .push_bind(&cursor.id)
                .push(")");
        }

        // Fetch one extra row to detect a next page.
        builder
            .push(" ORDER BY timestamp_ms DESC, trade_id DESC LIMIT ")
            .push_bind(limit + 1);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut trades: Vec<Trade> = rows.iter().map(trade_from_row).collect();

        let next_cursor = if trades.len() as i64 > limit {
            trades.truncate(limit as usize);
            trades.last().map(|last| {
                Cursor::new(last.timestamp.timestamp_millis(), last.trade_id.clone()).encode()
            })
        } else {
            None
        };

        Ok(TradeListResult {
            trades,
            next_cursor,
        })
    }
}

pub(crate) fn trade_from_row(row: &SqliteRow) -> Trade {
    let side_str: String = row.get("side");
    let market_str: String = row.get("market_type");
    Trade {
        trade_id: row.get("trade_id"),
        account_id: row.get("account_id"),
        symbol: row.get("symbol"),
        side: Side::from_str(&side_str).unwrap_or(Side::Buy),
        quantity: decimal_column(row, "quantity"),
        price: decimal_column(row, "price"),
        fee: decimal_column(row, "fee"),
        fee_currency: row.get("fee_currency"),
        market_type: MarketType::from_str(&market_str).unwrap_or(MarketType::Spot),
        timestamp: datetime_from_ms(row.get("timestamp_ms")),
        ingested_at: datetime_from_ms(row.get("ingested_at_ms")),
        cost_basis: decimal_column(row, "cost_basis"),
        realized_pnl: decimal_column(row, "realized_pnl"),
        leverage: row.get("leverage"),
        margin: optional_decimal_column(row, "margin"),
        liquidation_price: optional_decimal_column(row, "liquidation_price"),
        funding_fee: optional_decimal_column(row, "funding_fee"),
    }
}

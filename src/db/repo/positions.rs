//! Position operations: the transactional insert+upsert composite, rebuild,
//! and read queries.

use crate::domain::{Decimal, MarketType, Position, PositionSide, PositionStatus, Trade};
use crate::engine::{self, PositionAction};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::{datetime_from_ms, decimal_column, optional_decimal_column, Repository};

/// Status filter for listing positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionStatusFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl FromStr for PositionStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PositionStatusFilter::Open),
            "closed" => Ok(PositionStatusFilter::Closed),
            "all" => Ok(PositionStatusFilter::All),
            other => Err(format!(
                "invalid status: {other:?} (must be open, closed, or all)"
            )),
        }
    }
}

/// Portfolio summary for an account: open positions plus realized P&L
/// accumulated across open and closed rows.
#[derive(Debug, Serialize)]
pub struct PortfolioSummary {
    pub positions: Vec<Position>,
    pub total_realized_pnl: Decimal,
}

impl Repository {
    /// Apply the position engine to the trade and persist the result.
    ///
    /// Must run on the same transaction that inserted the trade, so the log
    /// and the derived view move together.
    pub async fn upsert_position(
        &self,
        conn: &mut SqliteConnection,
        trade: &Trade,
    ) -> Result<(), sqlx::Error> {
        let current = self
            .open_position(conn, &trade.account_id, &trade.symbol, trade.market_type)
            .await?;

        match engine::apply(current.as_ref(), trade) {
            PositionAction::Ignore => Ok(()),
            PositionAction::Write(position) => self.write_position(conn, &position).await,
        }
    }

    /// Insert the trade and update its position in one transaction.
    ///
    /// Returns whether the trade was newly inserted; a duplicate commits
    /// without touching position state. Any failure rolls the whole unit
    /// back.
    pub async fn insert_trade_and_update_position(
        &self,
        trade: &Trade,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = self.insert_trade(&mut tx, trade).await?;
        if inserted {
            self.upsert_position(&mut tx, trade).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Average entry price of the open position for the key, or 0 if none.
    pub async fn get_avg_entry_price(
        &self,
        account_id: &str,
        symbol: &str,
        market_type: MarketType,
    ) -> Result<Decimal, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT avg_entry_price FROM positions
            WHERE account_id = ? AND symbol = ? AND market_type = ? AND status = 'open'
            "#,
        )
        .bind(account_id)
        .bind(symbol)
        .bind(market_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| decimal_column(&r, "avg_entry_price"))
            .unwrap_or_else(Decimal::zero))
    }

    /// Delete the account's position rows and replay its trade log in
    /// (timestamp, trade_id) order, as one transaction.
    pub async fn rebuild_positions(&self, account_id: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM positions WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let trades = self.trades_for_rebuild(&mut tx, account_id).await?;
        for trade in &trades {
            self.upsert_position(&mut tx, trade).await?;
        }

        tx.commit().await
    }

    /// List positions for an account, newest first.
    pub async fn list_positions(
        &self,
        account_id: &str,
        status: PositionStatusFilter,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let base = r#"
            SELECT id, account_id, symbol, market_type, side, quantity, avg_entry_price,
                   cost_basis, realized_pnl, leverage, margin, liquidation_price,
                   status, opened_at_ms, closed_at_ms
            FROM positions
            WHERE account_id = ?
        "#;

        let rows = match status {
            PositionStatusFilter::All => {
                sqlx::query(&format!("{base} ORDER BY opened_at_ms DESC, id DESC"))
                    .bind(account_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            PositionStatusFilter::Open | PositionStatusFilter::Closed => {
                let status_str = if status == PositionStatusFilter::Open {
                    "open"
                } else {
                    "closed"
                };
                sqlx::query(&format!(
                    "{base} AND status = ? ORDER BY opened_at_ms DESC, id DESC"
                ))
                .bind(account_id)
                .bind(status_str)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(position_from_row).collect())
    }

    /// Open positions plus total realized P&L across all position rows.
    ///
    /// The sum runs in Rust over canonical decimal strings; SQLite's SUM
    /// would coerce to float.
    pub async fn get_portfolio_summary(
        &self,
        account_id: &str,
    ) -> Result<PortfolioSummary, sqlx::Error> {
        let positions = self
            .list_positions(account_id, PositionStatusFilter::Open)
            .await?;

        let rows = sqlx::query("SELECT realized_pnl FROM positions WHERE account_id = ?")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        let total_realized_pnl = rows
            .iter()
            .map(|row| decimal_column(row, "realized_pnl"))
            .sum();

        Ok(PortfolioSummary {
            positions,
            total_realized_pnl,
        })
    }

    async fn open_position(
        &self,
        conn: &mut SqliteConnection,
        account_id: &str,
        symbol: &str,
        market_type: MarketType,
    ) -> Result<Option<Position>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, symbol, market_type, side, quantity, avg_entry_price,
                   cost_basis, realized_pnl, leverage, margin, liquidation_price,
                   status, opened_at_ms, closed_at_ms
            FROM positions
            WHERE account_id = ? AND symbol = ? AND market_type = ? AND status = 'open'
            "#,
        )
        .bind(account_id)
        .bind(symbol)
        .bind(market_type.to_string())
        .fetch_optional(conn)
        .await?;

        Ok(row.as_ref().map(position_from_row))
    }

    async fn write_position(
        &self,
        conn: &mut SqliteConnection,
        position: &Position,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO positions (
                id, account_id, symbol, market_type, side, quantity, avg_entry_price,
                cost_basis, realized_pnl, leverage, margin, liquidation_price,
                status, opened_at_ms, closed_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&position.id)
        .bind(&position.account_id)
        .bind(&position.symbol)
        .bind(position.market_type.to_string())
        .bind(position.side.to_string())
        .bind(position.quantity.to_canonical_string())
        .bind(position.avg_entry_price.to_canonical_string())
        .bind(position.cost_basis.to_canonical_string())
        .bind(position.realized_pnl.to_canonical_string())
        .bind(position.leverage)
        .bind(position.margin.map(|d| d.to_canonical_string()))
        .bind(position.liquidation_price.map(|d| d.to_canonical_string()))
        .bind(position.status.to_string())
        .bind(position.opened_at.timestamp_millis())
        .bind(position.closed_at.map(|t| t.timestamp_millis()))
        .execute(conn)
        .await?;

        Ok(())
    }
}

fn position_from_row(row: &SqliteRow) -> Position {
    let market_str: String = row.get("market_type");
    let side_str: String = row.get("side");
    let status_str: String = row.get("status");
    let closed_at_ms: Option<i64> = row.get("closed_at_ms");
    Position {
        id: row.get("id"),
        account_id: row.get("account_id"),
        symbol: row.get("symbol"),
        market_type: MarketType::from_str(&market_str).unwrap_or(MarketType::Spot),
        side: PositionSide::from_str(&side_str).unwrap_or(PositionSide::Long),
        quantity: decimal_column(row, "quantity"),
        avg_entry_price: decimal_column(row, "avg_entry_price"),
        cost_basis: decimal_column(row, "cost_basis"),
        realized_pnl: decimal_column(row, "realized_pnl"),
        leverage: row.get("leverage"),
        margin: optional_decimal_column(row, "margin"),
        liquidation_price: optional_decimal_column(row, "liquidation_price"),
        status: PositionStatus::from_str(&status_str).unwrap_or(PositionStatus::Closed),
        opened_at: datetime_from_ms(row.get("opened_at_ms")),
        closed_at: closed_at_ms.map(datetime_from_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::setup_test_repo;
    use super::*;
    use crate::domain::{AccountType, Side};
    use chrono::{TimeZone, Utc};

    fn spot_trade(id: &str, side: Side, qty: &str, price: &str, fee: &str, minute: u32) -> Trade {
        Trade {
            trade_id: id.to_string(),
            account_id: "live".to_string(),
            symbol: "BTC-USD".to_string(),
            side,
            quantity: Decimal::from_str_canonical(qty).unwrap(),
            price: Decimal::from_str_canonical(price).unwrap(),
            fee: Decimal::from_str_canonical(fee).unwrap(),
            fee_currency: "USD".to_string(),
            market_type: MarketType::Spot,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, minute, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap(),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            leverage: None,
            margin: None,
            liquidation_price: None,
            funding_fee: None,
        }
    }

    async fn setup_account(repo: &Repository) {
        repo.get_or_create_account("live", AccountType::Live)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_closes_position() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        assert!(repo
            .insert_trade_and_update_position(&spot_trade("t1", Side::Buy, "0.5", "50000", "25", 0))
            .await
            .unwrap());
        assert!(repo
            .insert_trade_and_update_position(&spot_trade(
                "t2",
                Side::Sell,
                "0.5",
                "55000",
                "27.50",
                1
            ))
            .await
            .unwrap());

        let open = repo
            .list_positions("live", PositionStatusFilter::Open)
            .await
            .unwrap();
        assert!(open.is_empty());

        let closed = repo
            .list_positions("live", PositionStatusFilter::Closed)
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert!(closed[0].quantity.is_zero());
        assert_eq!(
            closed[0].realized_pnl,
            Decimal::from_str_canonical("2472.50").unwrap()
        );
    }

    #[tokio::test]
    async fn test_duplicate_trade_does_not_touch_position() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        let t = spot_trade("t1", Side::Buy, "1", "100", "0", 0);
        assert!(repo.insert_trade_and_update_position(&t).await.unwrap());
        assert!(!repo.insert_trade_and_update_position(&t).await.unwrap());

        let open = repo
            .list_positions("live", PositionStatusFilter::Open)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity, Decimal::from_str_canonical("1").unwrap());
    }

    #[tokio::test]
    async fn test_avg_entry_price_defaults_to_zero() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        let price = repo
            .get_avg_entry_price("live", "BTC-USD", MarketType::Spot)
            .await
            .unwrap();
        assert!(price.is_zero());

        repo.insert_trade_and_update_position(&spot_trade("t1", Side::Buy, "1", "40000", "0", 0))
            .await
            .unwrap();
        let price = repo
            .get_avg_entry_price("live", "BTC-USD", MarketType::Spot)
            .await
            .unwrap();
        assert_eq!(price, Decimal::from_str_canonical("40000").unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_matches_incremental() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        for t in [
            spot_trade("t1", Side::Buy, "1.0", "40000", "20", 0),
            spot_trade("t2", Side::Buy, "0.5", "42000", "10.50", 1),
            spot_trade("t3", Side::Sell, "0.5", "45000", "11.25", 2),
        ] {
            repo.insert_trade_and_update_position(&t).await.unwrap();
        }

        let incremental = repo
            .list_positions("live", PositionStatusFilter::All)
            .await
            .unwrap();

        repo.rebuild_positions("live").await.unwrap();
        let rebuilt = repo
            .list_positions("live", PositionStatusFilter::All)
            .await
            .unwrap();

        assert_eq!(incremental, rebuilt);
    }

    #[tokio::test]
    async fn test_rebuild_repairs_out_of_order_history() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        // The sell lands first (no position yet: ignored), then an earlier
        // buy arrives via backfill. Replay restores the true sequence.
        repo.insert_trade_and_update_position(&spot_trade("t2", Side::Sell, "1", "45000", "0", 5))
            .await
            .unwrap();
        repo.insert_trade_and_update_position(&spot_trade("t1", Side::Buy, "1", "40000", "0", 0))
            .await
            .unwrap();

        repo.rebuild_positions("live").await.unwrap();

        let all = repo
            .list_positions("live", PositionStatusFilter::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PositionStatus::Closed);
        assert_eq!(
            all[0].realized_pnl,
            Decimal::from_str_canonical("5000").unwrap()
        );
    }

    #[tokio::test]
    async fn test_reopen_after_close_gets_new_row() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        repo.insert_trade_and_update_position(&spot_trade("t1", Side::Buy, "1", "100", "0", 0))
            .await
            .unwrap();
        repo.insert_trade_and_update_position(&spot_trade("t2", Side::Sell, "1", "110", "0", 1))
            .await
            .unwrap();
        repo.insert_trade_and_update_position(&spot_trade("t3", Side::Buy, "2", "120", "0", 2))
            .await
            .unwrap();

        let all = repo
            .list_positions("live", PositionStatusFilter::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let open = repo
            .list_positions("live", PositionStatusFilter::Open)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].id, all.iter().find(|p| !p.is_open()).unwrap().id);
    }

    #[tokio::test]
    async fn test_portfolio_summary_sums_open_and_closed() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        // Closed BTC round trip: +1000.
        repo.insert_trade_and_update_position(&spot_trade("t1", Side::Buy, "1", "40000", "0", 0))
            .await
            .unwrap();
        repo.insert_trade_and_update_position(&spot_trade("t2", Side::Sell, "1", "41000", "0", 1))
            .await
            .unwrap();
        // Open ETH position with a partial close: +50.
        let mut eth_buy = spot_trade("t3", Side::Buy, "10", "2000", "0", 2);
        eth_buy.symbol = "ETH-USD".to_string();
        let mut eth_sell = spot_trade("t4", Side::Sell, "1", "2050", "0", 3);
        eth_sell.symbol = "ETH-USD".to_string();
        repo.insert_trade_and_update_position(&eth_buy).await.unwrap();
        repo.insert_trade_and_update_position(&eth_sell).await.unwrap();

        let summary = repo.get_portfolio_summary("live").await.unwrap();
        assert_eq!(summary.positions.len(), 1);
        assert_eq!(summary.positions[0].symbol, "ETH-USD");
        assert_eq!(
            summary.total_realized_pnl,
            Decimal::from_str_canonical("1050").unwrap()
        );
    }

    #[tokio::test]
    async fn test_spot_and_futures_positions_are_independent() {
        let (repo, _temp) = setup_test_repo().await;
        setup_account(&repo).await;

        let spot = spot_trade("t1", Side::Buy, "1", "100", "0", 0);
        let mut futures = spot_trade("t2", Side::Sell, "1", "100", "0", 1);
        futures.market_type = MarketType::Futures;

        repo.insert_trade_and_update_position(&spot).await.unwrap();
        repo.insert_trade_and_update_position(&futures).await.unwrap();

        let open = repo
            .list_positions("live", PositionStatusFilter::Open)
            .await
            .unwrap();
        assert_eq!(open.len(), 2);
        let sides: Vec<PositionSide> = open.iter().map(|p| p.side).collect();
        assert!(sides.contains(&PositionSide::Long));
        assert!(sides.contains(&PositionSide::Short));
    }
}

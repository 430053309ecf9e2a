//! Order operations for the repository.

use crate::domain::{MarketType, Order, OrderStatus, OrderType, Side};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;

use super::{clamp_limit, datetime_from_ms, decimal_column, Cursor, Repository};

/// Filters for listing orders.
#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub symbol: Option<String>,
    pub cursor: Option<Cursor>,
    pub limit: Option<i64>,
}

/// One page of orders.
#[derive(Debug, Serialize)]
pub struct OrderListResult {
    pub orders: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl Repository {
    /// Insert or update an order. Fill progress and status overwrite the
    /// existing row; identity fields stay as first written.
    pub async fn upsert_order(&self, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, account_id, symbol, side, order_type,
                requested_qty, filled_qty, avg_fill_price, status, market_type,
                created_at_ms, updated_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(order_id) DO UPDATE SET
                filled_qty = excluded.filled_qty,
                avg_fill_price = excluded.avg_fill_price,
                status = excluded.status,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.account_id)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.requested_qty.to_canonical_string())
        .bind(order.filled_qty.to_canonical_string())
        .bind(order.avg_fill_price.to_canonical_string())
        .bind(order.status.to_string())
        .bind(order.market_type.to_string())
        .bind(order.created_at.timestamp_millis())
        .bind(order.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List orders for an account with filters and keyset pagination,
    /// newest first.
    pub async fn list_orders(
        &self,
        account_id: &str,
        filter: &OrderFilter,
    ) -> Result<OrderListResult, sqlx::Error> {
        let limit = clamp_limit(filter.limit);

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT order_id, account_id, symbol, side, order_type,
                   requested_qty, filled_qty, avg_fill_price, status, market_type,
                   created_at_ms, updated_at_ms
            FROM orders
            WHERE account_id = "#,
        );
        builder.push_bind(account_id);

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(symbol) = &filter.symbol {
            builder.push(" AND symbol = ").push_bind(symbol);
        }
        if let Some(cursor) = &filter.cursor {
            builder
                .push(" AND (created_at_ms, order_id) < (")
                .push_bind(cursor.timestamp_ms)
                .push(", ")
                .push_bind(&cursor.id)
                .push(")");
        }

        builder
            .push(" ORDER BY created_at_ms DESC, order_id DESC LIMIT ")
            .push_bind(limit + 1);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut orders: Vec<Order> = rows.iter().map(order_from_row).collect();

        let next_cursor = if orders.len() as i64 > limit {
            orders.truncate(limit as usize);
            orders.last().map(|last| {
                Cursor::new(last.created_at.timestamp_millis(), last.order_id.clone()).encode()
            })
        } else {
            None
        };

        Ok(OrderListResult {
            orders,
            next_cursor,
        })
    }
}

fn order_from_row(row: &SqliteRow) -> Order {
    let side_str: String = row.get("side");
    let type_str: String = row.get("order_type");
    let status_str: String = row.get("status");
    let market_str: String = row.get("market_type");
    Order {
        order_id: row.get("order_id"),
        account_id: row.get("account_id"),
        symbol: row.get("symbol"),
        side: Side::from_str(&side_str).unwrap_or(Side::Buy),
        order_type: OrderType::from_str(&type_str).unwrap_or(OrderType::Market),
        requested_qty: decimal_column(row, "requested_qty"),
        filled_qty: decimal_column(row, "filled_qty"),
        avg_fill_price: decimal_column(row, "avg_fill_price"),
        status: OrderStatus::from_str(&status_str).unwrap_or(OrderStatus::Open),
        market_type: MarketType::from_str(&market_str).unwrap_or(MarketType::Spot),
        created_at: datetime_from_ms(row.get("created_at_ms")),
        updated_at: datetime_from_ms(row.get("updated_at_ms")),
    }
}

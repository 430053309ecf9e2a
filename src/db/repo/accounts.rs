//! Account operations for the repository.

use crate::domain::{Account, AccountType};
use sqlx::Row;
use std::str::FromStr;

use super::{datetime_from_ms, Repository};

impl Repository {
    /// Look up an account by id, creating it if absent. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the lookup or insert fails.
    pub async fn get_or_create_account(
        &self,
        id: &str,
        account_type: AccountType,
    ) -> Result<Account, sqlx::Error> {
        // Concurrent first references race on the insert; DO NOTHING makes
        // the loser fall through to the read.
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, type, created_at_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(account_type.to_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, name, type, created_at_ms FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(account_from_row(&row))
    }

    /// Check whether an account exists.
    pub async fn account_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// List all accounts in creation order.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, name, type, created_at_ms FROM accounts ORDER BY created_at_ms, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(account_from_row).collect())
    }
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Account {
    let type_str: String = row.get("type");
    Account {
        id: row.get("id"),
        name: row.get("name"),
        account_type: AccountType::from_str(&type_str).unwrap_or(AccountType::Live),
        created_at: datetime_from_ms(row.get("created_at_ms")),
    }
}

//! Account record.

use crate::domain::AccountType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trading account. Auto-created the first time a trade references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

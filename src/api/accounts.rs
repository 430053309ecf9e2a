use axum::extract::{Path, State};
use axum::Json;

use super::AppState;
use crate::db::repo::PortfolioSummary;
use crate::domain::Account;
use crate::error::AppError;

pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<Vec<Account>>, AppError> {
    let accounts = state.repo.list_accounts().await?;
    Ok(Json(accounts))
}

pub async fn get_portfolio(
    Path(account_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PortfolioSummary>, AppError> {
    if !state.repo.account_exists(&account_id).await? {
        return Err(AppError::NotFound("account not found".to_string()));
    }

    let summary = state.repo.get_portfolio_summary(&account_id).await?;
    Ok(Json(summary))
}

//! Student account routes: balance, history, transfers, and shop purchases.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use classbank_core::ledger::{Account, MovementReceipt, Transaction, TreasuryTransaction};
use classbank_shared::types::{AccountId, PageRequest, PageResponse, within_money_range};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{AppState, error::ApiError, middleware::CurrentActor};

/// Creates the account routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(open_account))
        .route("/accounts/me", get(get_my_account))
        .route("/accounts/me/transactions", get(get_my_history))
        .route("/accounts/{account_id}/transactions", get(get_history))
        .route("/transfers", post(create_transfer))
        .route("/purchases", post(create_purchase))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Rejects amounts that are not strictly positive or exceed the money range.
pub(crate) fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_positive() && !amount.is_zero() && within_money_range(*amount) {
        Ok(())
    } else {
        Err(ValidationError::new("positive_amount"))
    }
}

/// Request body for a transfer to another student.
#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequest {
    /// Receiving account.
    pub to_account_id: AccountId,
    /// Amount to send.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    /// Note shown on both statements.
    #[validate(length(min = 1, max = 200))]
    pub description: String,
}

/// Request body for a shop purchase.
#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseRequest {
    /// Price paid.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    /// Item bought.
    #[validate(length(min = 1, max = 200))]
    pub item: String,
}

/// Rows written by a movement.
#[derive(Debug, Serialize)]
pub struct MovementResponse {
    /// Account-side log row.
    pub transaction: Option<Transaction>,
    /// Treasury-side log rows.
    pub treasury_transactions: Vec<TreasuryTransaction>,
    /// Balance of the debited party afterwards.
    pub source_balance: Option<Decimal>,
    /// Balance of the credited party afterwards.
    pub destination_balance: Option<Decimal>,
}

impl From<MovementReceipt> for MovementResponse {
    fn from(receipt: MovementReceipt) -> Self {
        Self {
            transaction: receipt.transaction,
            treasury_transactions: receipt.treasury_transactions,
            source_balance: receipt.source_balance,
            destination_balance: receipt.destination_balance,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST `/accounts` - Open the caller's account. Repeat calls return the same account.
async fn open_account(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .accounts
        .open_account(actor.tenant_id, actor.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET `/accounts/me` - The caller's account and balance.
async fn get_my_account(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(state.accounts.my_account(&actor).await?))
}

/// GET `/accounts/me/transactions` - The caller's statement, newest first.
async fn get_my_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(page): Query<PageRequest>,
) -> Result<Json<PageResponse<Transaction>>, ApiError> {
    let account = state.accounts.my_account(&actor).await?;
    Ok(Json(state.accounts.history(&actor, account.id, page).await?))
}

/// GET `/accounts/{account_id}/transactions` - Statement of any account, for staff.
async fn get_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(account_id): Path<AccountId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<PageResponse<Transaction>>, ApiError> {
    Ok(Json(state.accounts.history(&actor, account_id, page).await?))
}

/// POST `/transfers` - Send money to another student.
async fn create_transfer(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let receipt = state
        .accounts
        .transfer(&actor, req.to_account_id, req.amount, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(MovementResponse::from(receipt))))
}

/// POST `/purchases` - Pay the shop.
async fn create_purchase(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let receipt = state
        .accounts
        .purchase(&actor, req.amount, &req.item)
        .await?;
    Ok((StatusCode::CREATED, Json(MovementResponse::from(receipt))))
}

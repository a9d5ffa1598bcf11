//! Class treasury routes for teachers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use classbank_core::ledger::{Treasury, TreasuryTransaction};
use classbank_shared::types::{AccountId, PageRequest, PageResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::accounts::{MovementResponse, positive_amount};
use crate::{AppState, error::ApiError, middleware::CurrentActor};

/// Creates the treasury routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/classes/{class_name}/treasury", get(get_treasury))
        .route(
            "/classes/{class_name}/treasury/transactions",
            get(get_treasury_history),
        )
        .route("/classes/{class_name}/treasury/deposits", post(create_deposit))
        .route("/classes/{class_name}/fines", post(create_fine))
}

/// Request body for funding a class treasury.
#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    /// Amount to add.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    /// Note on the treasury statement.
    #[validate(length(min = 1, max = 200))]
    pub description: String,
}

/// Request body for fining a student.
#[derive(Debug, Deserialize, Validate)]
pub struct FineRequest {
    /// Fined account.
    pub account_id: AccountId,
    /// Amount of the fine.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    /// Reason shown to the student.
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
}

/// Treasury balance. A class that was never funded reads as zero.
#[derive(Debug, Serialize)]
pub struct TreasuryResponse {
    /// Class name.
    pub class_name: String,
    /// Current balance.
    pub balance: Decimal,
    /// Stored row, if the treasury has been used.
    pub treasury: Option<Treasury>,
}

/// GET `/classes/{class_name}/treasury`
async fn get_treasury(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
) -> Result<Json<TreasuryResponse>, ApiError> {
    let treasury = state.accounts.treasury(&actor, &class_name).await?;
    Ok(Json(TreasuryResponse {
        class_name,
        balance: treasury.as_ref().map_or(Decimal::ZERO, |t| t.balance),
        treasury,
    }))
}

/// GET `/classes/{class_name}/treasury/transactions`
async fn get_treasury_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<PageResponse<TreasuryTransaction>>, ApiError> {
    Ok(Json(
        state
            .accounts
            .treasury_history(&actor, &class_name, page)
            .await?,
    ))
}

/// POST `/classes/{class_name}/treasury/deposits`
async fn create_deposit(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let receipt = state
        .accounts
        .deposit(&actor, &class_name, req.amount, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(MovementResponse::from(receipt))))
}

/// POST `/classes/{class_name}/fines`
async fn create_fine(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
    Json(req): Json<FineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let receipt = state
        .accounts
        .fine(&actor, &class_name, req.account_id, req.amount, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(MovementResponse::from(receipt))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CLASS, TestApp, money};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn test_deposit_then_read() {
        let app = TestApp::new();
        let teacher = app.teacher();

        let (status, _) = app
            .send(
                Some(&teacher),
                "POST",
                &format!("/api/v1/classes/{CLASS}/treasury/deposits"),
                Some(json!({ "amount": "1000", "description": "Term budget" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .send(
                Some(&teacher),
                "GET",
                &format!("/api/v1/classes/{CLASS}/treasury"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(money(&body["balance"]), dec!(1000));

        let (_, history) = app
            .send(
                Some(&teacher),
                "GET",
                &format!("/api/v1/classes/{CLASS}/treasury/transactions"),
                None,
            )
            .await;
        assert_eq!(history["data"][0]["flow"], "inflow");
        assert_eq!(history["data"][0]["kind"], "deposit");
    }

    #[tokio::test]
    async fn test_unfunded_treasury_reads_zero() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                Some(&app.teacher()),
                "GET",
                "/api/v1/classes/7B/treasury",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(money(&body["balance"]), dec!(0));
        assert!(body["treasury"].is_null());
    }

    #[tokio::test]
    async fn test_students_cannot_deposit() {
        let app = TestApp::new();
        let alice = app.account_with(dec!(0)).await;

        let (status, _) = app
            .send(
                Some(&app.student(&alice)),
                "POST",
                &format!("/api/v1/classes/{CLASS}/treasury/deposits"),
                Some(json!({ "amount": "1000", "description": "Free money" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(app.class_balance().await, dec!(0));
    }

    #[tokio::test]
    async fn test_fine_moves_money_to_the_class() {
        let app = TestApp::new();
        let alice = app.account_with(dec!(80)).await;

        let (status, _) = app
            .send(
                Some(&app.teacher()),
                "POST",
                &format!("/api/v1/classes/{CLASS}/fines"),
                Some(json!({ "account_id": alice.id, "amount": "25", "reason": "Late homework" })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(app.balance(&alice).await, dec!(55));
        assert_eq!(app.class_balance().await, dec!(25));
    }
}

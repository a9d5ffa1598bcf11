//! Loan routes: quotes, applications, teacher decisions, repayments, and reports.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use classbank_core::loan::{Loan, LoanPayment, LoanQuote, ReconciliationEntry, SettlementReport};
use classbank_shared::types::LoanId;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::accounts::positive_amount;
use crate::{AppState, error::ApiError, middleware::CurrentActor};

/// Creates the loan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/loans", get(list_loans).post(apply_for_loan))
        .route("/loans/quote", get(quote_loan))
        .route("/loans/reconciliation", get(reconcile_loans))
        .route("/loans/settlement", post(settle_loans))
        .route("/loans/{loan_id}", get(get_loan))
        .route("/loans/{loan_id}/approve", post(approve_loan))
        .route("/loans/{loan_id}/deny", post(deny_loan))
        .route(
            "/loans/{loan_id}/payments",
            get(list_payments).post(make_payment),
        )
        .route("/loans/{loan_id}/payoff", post(pay_off_loan))
}

/// Loan terms, as a query for quotes or a body for applications.
#[derive(Debug, Deserialize, Validate)]
pub struct LoanTermsRequest {
    /// Principal.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    /// Term in weeks.
    #[validate(range(min = 1))]
    pub term_weeks: u32,
}

/// Request body for a manual payment.
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    /// Amount to pay; clamped to the outstanding balance.
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
}

/// GET `/loans/quote?amount=&term_weeks=`
async fn quote_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(req): Query<LoanTermsRequest>,
) -> Result<Json<LoanQuote>, ApiError> {
    req.validate()?;
    Ok(Json(
        state
            .loans
            .quote(actor.tenant_id, req.amount, req.term_weeks)
            .await?,
    ))
}

/// POST `/loans` - Apply for a loan.
async fn apply_for_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<LoanTermsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let loan = state
        .loans
        .apply(&actor, req.amount, req.term_weeks)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// GET `/loans` - Own loans, or every loan of the tenant for staff.
async fn list_loans(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<Loan>>, ApiError> {
    Ok(Json(state.loans.list_loans(&actor).await?))
}

/// GET `/loans/{loan_id}`
async fn get_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Loan>, ApiError> {
    Ok(Json(state.loans.get_loan(&actor, loan_id).await?))
}

/// POST `/loans/{loan_id}/approve` - Approve and pay out the principal.
async fn approve_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Loan>, ApiError> {
    Ok(Json(state.loans.approve(&actor, loan_id).await?))
}

/// POST `/loans/{loan_id}/deny`
async fn deny_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Loan>, ApiError> {
    Ok(Json(state.loans.deny(&actor, loan_id).await?))
}

/// GET `/loans/{loan_id}/payments`
async fn list_payments(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<Vec<LoanPayment>>, ApiError> {
    Ok(Json(state.loans.payments(&actor, loan_id).await?))
}

/// POST `/loans/{loan_id}/payments` - Pay part of the loan early.
async fn make_payment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
    Json(req): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let payment = state
        .loans
        .make_payment(&actor, loan_id, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST `/loans/{loan_id}/payoff` - Pay the whole outstanding balance.
async fn pay_off_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(loan_id): Path<LoanId>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.loans.pay_off(&actor, loan_id).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET `/loans/reconciliation` - Cached versus derived outstanding balances.
async fn reconcile_loans(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<ReconciliationEntry>>, ApiError> {
    Ok(Json(state.loans.reconcile(&actor).await?))
}

/// POST `/loans/settlement` - Take this week's installments for the caller's tenant.
async fn settle_loans(
    State(state): State<AppState>,
    actor: CurrentActor,
) -> Result<Json<SettlementReport>, ApiError> {
    let actor = actor.require_staff()?;
    let report = state.loans.settle_due(Some(actor.tenant_id)).await?;
    info!(
        tenant_id = %actor.tenant_id,
        settled = report.settled.len(),
        failed = report.failures.len(),
        "Settlement triggered by staff"
    );
    Ok(Json(report))
}

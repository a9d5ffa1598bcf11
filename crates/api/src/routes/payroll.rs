//! Payroll routes. Teachers preview and run the weekly class payroll.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use classbank_core::payroll::{PaySlip, PayrollReport};

use crate::{AppState, error::ApiError, middleware::CurrentActor};

/// Creates the payroll routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/classes/{class_name}/payroll/preview", get(preview_salaries))
        .route("/classes/{class_name}/payroll/salaries", post(run_salaries))
        .route("/classes/{class_name}/payroll/basic", post(run_basic_salaries))
}

/// GET `/classes/{class_name}/payroll/preview` - This week's slips, nothing paid.
async fn preview_salaries(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
) -> Result<Json<Vec<PaySlip>>, ApiError> {
    Ok(Json(
        state.payroll.preview_salaries(&actor, &class_name).await?,
    ))
}

/// POST `/classes/{class_name}/payroll/salaries` - Pay this week's job salaries.
async fn run_salaries(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report: PayrollReport = state.payroll.run_salaries(&actor, &class_name).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// POST `/classes/{class_name}/payroll/basic` - Pay this week's basic salary.
async fn run_basic_salaries(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(class_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .payroll
        .run_basic_salaries(&actor, &class_name)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CLASS, TestApp, money};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_salary_run_pays_once_per_week() {
        let app = TestApp::new();
        app.fund_class(dec!(100000)).await;
        let mut students = Vec::new();
        for _ in 0..5 {
            let account = app.account_with(dec!(0)).await;
            app.employ(&account, dec!(2000)).await;
            students.push(account);
        }
        let teacher = app.teacher();
        let uri = format!("/api/v1/classes/{CLASS}/payroll/salaries");

        let (status, preview) = app
            .send(
                Some(&teacher),
                "GET",
                &format!("/api/v1/classes/{CLASS}/payroll/preview"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview.as_array().unwrap().len(), 5);
        assert_eq!(app.class_balance().await, dec!(100000));

        let (status, report) = app.send(Some(&teacher), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["run"]["paid_count"], 5);
        assert_eq!(money(&report["run"]["total_net"]), dec!(9500));
        assert_eq!(money(&report["run"]["total_tax"]), dec!(500));
        assert_eq!(money(&report["treasury_balance"]), dec!(90500));
        assert_eq!(app.class_balance().await, dec!(90500));
        for student in &students {
            assert_eq!(app.balance(student).await, dec!(1900));
        }

        let (status, err) = app.send(Some(&teacher), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "PAYROLL_ALREADY_RUN");
        assert_eq!(app.class_balance().await, dec!(90500));
    }

    #[tokio::test]
    async fn test_shortfall_pays_nobody() {
        let app = TestApp::new();
        app.fund_class(dec!(1000)).await;
        let alice = app.account_with(dec!(0)).await;
        app.employ(&alice, dec!(2000)).await;

        let (status, err) = app
            .send(
                Some(&app.teacher()),
                "POST",
                &format!("/api/v1/classes/{CLASS}/payroll/salaries"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"], "TREASURY_INSUFFICIENT_FUNDS");
        assert_eq!(money(&err["shortfall"]), dec!(900));
        assert_eq!(app.balance(&alice).await, dec!(0));
        assert_eq!(app.class_balance().await, dec!(1000));
    }

    #[tokio::test]
    async fn test_students_cannot_run_payroll() {
        let app = TestApp::new();
        let alice = app.account_with(dec!(0)).await;
        let (status, _) = app
            .send(
                Some(&app.student(&alice)),
                "POST",
                &format!("/api/v1/classes/{CLASS}/payroll/basic"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

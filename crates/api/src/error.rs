//! Rendering of domain errors as JSON responses.
//!
//! Every domain error keeps its own code (`INSUFFICIENT_FUNDS`,
//! `LOAN_ALREADY_OPEN`, ...) while the status comes from the matching
//! [`AppError`] variant. Infrastructure failures are logged here and reach the
//! client as a generic message.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use classbank_core::earnings::EarningsError;
use classbank_core::ledger::LedgerError;
use classbank_core::loan::LoanError;
use classbank_core::payroll::PayrollError;
use classbank_core::store::StoreError;
use classbank_shared::AppError;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::error;
use validator::ValidationErrors;

/// Seconds a client should wait before retrying after a lock timeout.
const BUSY_RETRY_AFTER_SECS: i64 = 1;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    kind: AppError,
    code: &'static str,
    shortfall: Option<Decimal>,
    retry_after_secs: Option<i64>,
}

impl ApiError {
    /// Builds an error from a domain status and code.
    fn domain(status: u16, code: &'static str, message: String) -> Self {
        let kind = match status {
            500 => {
                error!(code, error = %message, "Request failed");
                AppError::Internal("An internal error occurred".to_string())
            }
            503 => {
                error!(code, error = %message, "Request timed out waiting for a lock");
                AppError::Busy("The service is busy, please retry".to_string())
            }
            _ => AppError::from_status(status, message),
        };
        Self {
            kind,
            code,
            shortfall: None,
            retry_after_secs: (status == 503).then_some(BUSY_RETRY_AFTER_SECS),
        }
    }

    fn with_shortfall(mut self, shortfall: Option<Decimal>) -> Self {
        self.shortfall = shortfall;
        self
    }

    fn with_retry_after(mut self, secs: i64) -> Self {
        self.retry_after_secs = Some(secs.max(1));
        self
    }

    /// Missing or unusable credentials.
    #[must_use]
    pub fn unauthorized(code: &'static str, message: &str) -> Self {
        Self {
            kind: AppError::Unauthorized(message.to_string()),
            code,
            shortfall: None,
            retry_after_secs: None,
        }
    }

    /// Caller lacks the role for the operation.
    #[must_use]
    pub fn forbidden(message: &str) -> Self {
        Self {
            kind: AppError::Forbidden(message.to_string()),
            code: "FORBIDDEN",
            shortfall: None,
            retry_after_secs: None,
        }
    }

    /// Request is malformed.
    #[must_use]
    pub fn validation(message: &str) -> Self {
        Self {
            kind: AppError::Validation(message.to_string()),
            code: "VALIDATION_ERROR",
            shortfall: None,
            retry_after_secs: None,
        }
    }

    /// HTTP status of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.kind {
            AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Validation(m)
            | AppError::BusinessRule(m)
            | AppError::Conflict(m)
            | AppError::RateLimited(m)
            | AppError::Busy(m)
            | AppError::Database(m)
            | AppError::Internal(m) => m.clone(),
        };

        let mut body = json!({ "error": self.code, "message": message });
        if let Some(shortfall) = self.shortfall {
            body["shortfall"] = json!(shortfall);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::domain(e.http_status_code(), e.error_code(), e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let shortfall = e.shortfall();
        Self::domain(e.http_status_code(), e.error_code(), e.to_string()).with_shortfall(shortfall)
    }
}

impl From<LoanError> for ApiError {
    fn from(e: LoanError) -> Self {
        let base = Self::domain(e.http_status_code(), e.error_code(), e.to_string());
        match e {
            LoanError::PaymentCooldown { retry_after_secs } => base.with_retry_after(retry_after_secs),
            LoanError::Ledger(inner) => base.with_shortfall(inner.shortfall()),
            _ => base,
        }
    }
}

impl From<PayrollError> for ApiError {
    fn from(e: PayrollError) -> Self {
        let shortfall = e.shortfall();
        Self::domain(e.http_status_code(), e.error_code(), e.to_string()).with_shortfall(shortfall)
    }
}

impl From<EarningsError> for ApiError {
    fn from(e: EarningsError) -> Self {
        let base = Self::domain(e.http_status_code(), e.error_code(), e.to_string());
        match e {
            EarningsError::RateLimited { window_secs } => base.with_retry_after(window_secs),
            EarningsError::Ledger(inner) => base.with_shortfall(inner.shortfall()),
            _ => base,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        Self::validation(&e.to_string())
    }
}

//! Loan error types.

use classbank_shared::types::LoanId;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::LoanStatus;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Errors that can occur during loan operations.
#[derive(Debug, Error)]
pub enum LoanError {
    // ========== Validation Errors ==========
    /// Principal or payment amount is not a positive whole-cent amount.
    #[error("Invalid loan amount: {0}")]
    InvalidAmount(Decimal),

    /// Term is outside the supported range.
    #[error("Invalid term of {term_weeks} weeks; terms run from 1 to {max_weeks} weeks")]
    InvalidTerm {
        /// Requested term.
        term_weeks: u32,
        /// Longest supported term.
        max_weeks: u32,
    },

    // ========== Eligibility Errors ==========
    /// Borrower has no paying job.
    #[error("A job is required to borrow")]
    NoEmployment,

    /// Borrower's balance is negative.
    #[error("Account is frozen while its balance is negative")]
    AccountFrozenNegative,

    /// Installment exceeds the share of salary allowed.
    #[error("Weekly payment {weekly_payment} exceeds the limit of {limit}")]
    Unaffordable {
        /// Installment of the requested loan.
        weekly_payment: Decimal,
        /// Largest allowed installment.
        limit: Decimal,
    },

    // ========== Not Found ==========
    /// Loan not found in the tenant.
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// No account has been opened for the caller.
    #[error("No account opened for this user")]
    NoAccount,

    // ========== Permission Errors ==========
    /// Caller may not perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ========== Conflict Errors ==========
    /// Borrower already has a loan in progress.
    #[error("Loan {0} is still open")]
    LoanAlreadyOpen(LoanId),

    /// Status does not allow the requested transition.
    #[error("Cannot move loan from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: LoanStatus,
        /// Requested status.
        to: LoanStatus,
    },

    /// Loan is not being repaid.
    #[error("Loan is {0}, not active")]
    NotActive(LoanStatus),

    /// A manual payment was made too recently.
    #[error("Payment made too recently; retry in {retry_after_secs} seconds")]
    PaymentCooldown {
        /// Seconds until the next payment is accepted.
        retry_after_secs: i64,
    },

    // ========== Delegated ==========
    /// Movement failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoanError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidTerm { .. } => "INVALID_TERM",
            Self::NoEmployment => "NO_EMPLOYMENT",
            Self::AccountFrozenNegative => "ACCOUNT_FROZEN_NEGATIVE",
            Self::Unaffordable { .. } => "UNAFFORDABLE",
            Self::LoanNotFound(_) => "LOAN_NOT_FOUND",
            Self::NoAccount => "NO_ACCOUNT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::LoanAlreadyOpen(_) => "LOAN_ALREADY_OPEN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotActive(_) => "LOAN_NOT_ACTIVE",
            Self::PaymentCooldown { .. } => "PAYMENT_COOLDOWN",
            Self::Ledger(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidAmount(_) | Self::InvalidTerm { .. } => 400,
            Self::Forbidden(_) => 403,
            Self::LoanNotFound(_) | Self::NoAccount => 404,
            Self::LoanAlreadyOpen(_)
            | Self::InvalidTransition { .. }
            | Self::NotActive(_)
            | Self::PaymentCooldown { .. } => 409,
            Self::NoEmployment | Self::AccountFrozenNegative | Self::Unaffordable { .. } => 422,
            Self::Ledger(e) => e.http_status_code(),
            Self::Store(e) => e.http_status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LoanError::InvalidAmount(dec!(0)).http_status_code(), 400);
        assert_eq!(LoanError::LoanAlreadyOpen(LoanId::new()).http_status_code(), 409);
        assert_eq!(
            LoanError::PaymentCooldown {
                retry_after_secs: 5
            }
            .http_status_code(),
            409
        );
        assert_eq!(LoanError::NoEmployment.http_status_code(), 422);
        assert_eq!(
            LoanError::Ledger(LedgerError::InsufficientFunds {
                available: dec!(1),
                requested: dec!(2),
            })
            .http_status_code(),
            422
        );
    }

    #[test]
    fn test_delegated_codes() {
        assert_eq!(
            LoanError::Store(StoreError::LockTimeout).error_code(),
            "LOCK_TIMEOUT"
        );
        assert_eq!(
            LoanError::InvalidTransition {
                from: LoanStatus::Denied,
                to: LoanStatus::Active,
            }
            .to_string(),
            "Cannot move loan from denied to active"
        );
    }
}

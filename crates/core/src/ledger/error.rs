//! Ledger error types.
//!
//! Every error leaves balances exactly as they were: the unit that raised it
//! is rolled back.

use classbank_shared::types::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::TreasuryScope;
use crate::store::StoreError;

/// Errors that can occur while applying a movement.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount is not positive or has more than two decimal places.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Credit would take a balance past the stored money range.
    #[error("Balance limit exceeded: balance {balance}, credit {amount}")]
    BalanceLimitExceeded {
        /// Balance before the credit.
        balance: Decimal,
        /// Amount credited.
        amount: Decimal,
    },

    /// Source and destination are the same party.
    #[error("Source and destination must differ")]
    SameParty,

    /// A disbursement credits the same account twice.
    #[error("Account {0} appears twice in one disbursement")]
    DuplicateRecipient(AccountId),

    /// A disbursement has nothing to pay.
    #[error("Disbursement has no recipients")]
    EmptyBatch,

    /// Caller may not perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ========== Account Errors ==========
    /// Account not found in the tenant.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// No account has been opened for the caller.
    #[error("No account opened for this user")]
    NoAccount,

    // ========== Insufficiency Errors ==========
    /// Account balance is negative; ordinary debits are blocked.
    #[error("Account {0} is frozen while its balance is negative")]
    AccountFrozenNegative(AccountId),

    /// Account cannot cover the debit.
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Current balance.
        available: Decimal,
        /// Amount requested.
        requested: Decimal,
    },

    /// Treasury cannot cover the debit.
    #[error("Treasury {scope} has insufficient funds: available {available}, requested {requested}")]
    TreasuryInsufficientFunds {
        /// Scope of the treasury.
        scope: TreasuryScope,
        /// Current balance.
        available: Decimal,
        /// Amount requested.
        requested: Decimal,
    },

    // ========== Infrastructure Errors ==========
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::BalanceLimitExceeded { .. } => "BALANCE_LIMIT_EXCEEDED",
            Self::SameParty => "SAME_PARTY",
            Self::DuplicateRecipient(_) => "DUPLICATE_RECIPIENT",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::NoAccount => "NO_ACCOUNT",
            Self::AccountFrozenNegative(_) => "ACCOUNT_FROZEN_NEGATIVE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::TreasuryInsufficientFunds { .. } => "TREASURY_INSUFFICIENT_FUNDS",
            Self::Store(e) => e.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::InvalidAmount(_)
            | Self::SameParty
            | Self::DuplicateRecipient(_)
            | Self::EmptyBatch => 400,

            // 403 Forbidden
            Self::Forbidden(_) => 403,

            // 404 Not Found
            Self::AccountNotFound(_) | Self::NoAccount => 404,

            // 422 Unprocessable - insufficiency detected inside the unit
            Self::AccountFrozenNegative(_)
            | Self::BalanceLimitExceeded { .. }
            | Self::InsufficientFunds { .. }
            | Self::TreasuryInsufficientFunds { .. } => 422,

            Self::Store(e) => e.http_status_code(),
        }
    }

    /// Amount missing to complete the movement, for insufficiency errors.
    #[must_use]
    pub fn shortfall(&self) -> Option<Decimal> {
        match self {
            Self::InsufficientFunds {
                available,
                requested,
            }
            | Self::TreasuryInsufficientFunds {
                available,
                requested,
                ..
            } => Some(*requested - *available),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InvalidAmount(dec!(0)).error_code(), "INVALID_AMOUNT");
        assert_eq!(LedgerError::SameParty.error_code(), "SAME_PARTY");
        assert_eq!(
            LedgerError::AccountFrozenNegative(AccountId::new()).error_code(),
            "ACCOUNT_FROZEN_NEGATIVE"
        );
        assert_eq!(
            LedgerError::Store(StoreError::LockTimeout).error_code(),
            "LOCK_TIMEOUT"
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LedgerError::InvalidAmount(dec!(-1)).http_status_code(), 400);
        assert_eq!(LedgerError::AccountNotFound(AccountId::new()).http_status_code(), 404);
        assert_eq!(
            LedgerError::InsufficientFunds {
                available: dec!(10),
                requested: dec!(20),
            }
            .http_status_code(),
            422
        );
        assert_eq!(LedgerError::Store(StoreError::LockTimeout).http_status_code(), 503);
        assert_eq!(
            LedgerError::Store(StoreError::Database("down".into())).http_status_code(),
            500
        );
    }

    #[test]
    fn test_shortfall() {
        let err = LedgerError::TreasuryInsufficientFunds {
            scope: TreasuryScope::class("6A"),
            available: dec!(100),
            requested: dec!(250.50),
        };
        assert_eq!(err.shortfall(), Some(dec!(150.50)));
        assert_eq!(LedgerError::SameParty.shortfall(), None);
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientFunds {
            available: dec!(10.00),
            requested: dec!(20.00),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: available 10.00, requested 20.00"
        );
    }
}

//! Payroll error types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Errors that can occur during a payroll run.
#[derive(Debug, Error)]
pub enum PayrollError {
    /// Caller may not run payroll.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Nobody is enrolled in the class.
    #[error("Class {0} has no students")]
    EmptyRoster(String),

    /// No enrolled student is owed anything by this run.
    #[error("Nobody in class {0} is owed pay by this run")]
    NothingToPay(String),

    /// The town pays no basic salary.
    #[error("Basic salary is disabled for class {0}")]
    BasicSalaryDisabled(String),

    /// A run of the same kind already paid this week.
    #[error("Payroll for {class_name} already ran for the week of {period_start}")]
    AlreadyPaid {
        /// Paid class.
        class_name: String,
        /// Monday of the paid week.
        period_start: NaiveDate,
    },

    /// The class treasury cannot cover the net payroll.
    #[error("Treasury holds {available} but the payroll needs {required}")]
    TreasuryShortfall {
        /// Treasury balance.
        available: Decimal,
        /// Net payroll.
        required: Decimal,
    },

    /// Movement failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PayrollError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "FORBIDDEN",
            Self::EmptyRoster(_) => "EMPTY_ROSTER",
            Self::NothingToPay(_) => "NOTHING_TO_PAY",
            Self::BasicSalaryDisabled(_) => "BASIC_SALARY_DISABLED",
            Self::AlreadyPaid { .. } => "PAYROLL_ALREADY_RUN",
            Self::TreasuryShortfall { .. } => "TREASURY_INSUFFICIENT_FUNDS",
            Self::Ledger(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Forbidden(_) => 403,
            Self::AlreadyPaid { .. } => 409,
            Self::EmptyRoster(_)
            | Self::NothingToPay(_)
            | Self::BasicSalaryDisabled(_)
            | Self::TreasuryShortfall { .. } => 422,
            Self::Ledger(e) => e.http_status_code(),
            Self::Store(e) => e.http_status_code(),
        }
    }

    /// Amount missing from the treasury, for shortfall errors.
    #[must_use]
    pub fn shortfall(&self) -> Option<Decimal> {
        match self {
            Self::TreasuryShortfall {
                available,
                required,
            } => Some(*required - *available),
            Self::Ledger(e) => e.shortfall(),
            _ => None,
        }
    }
}

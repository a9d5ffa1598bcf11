//! Loan subsystem.
//!
//! `pending -> {approved, denied}`, `approved -> active`, `active -> paid_off`.
//! Approval pays out the principal; the weekly settlement and manual payments
//! repay it.

pub mod error;
pub mod schedule;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod tests;

pub use error::LoanError;
pub use service::LoanService;
pub use types::{
    Loan, LoanPayment, LoanQuote, LoanStatus, PaymentSource, ReconciliationEntry, SettledLoan,
    SettlementFailure, SettlementReport,
};

//! Loan domain types.

use chrono::{DateTime, NaiveDate, Utc};
use classbank_shared::types::{AccountId, LoanId, LoanPaymentId, TenantId, TransactionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Loan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Waiting for a teacher decision.
    Pending,
    /// Approved; becomes active in the same unit once the principal is paid out.
    Approved,
    /// Rejected by a teacher. Terminal.
    Denied,
    /// Being repaid.
    Active,
    /// Fully repaid. Terminal.
    PaidOff,
}

impl LoanStatus {
    /// True while the loan blocks a new application.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Active)
    }

    /// Returns the status as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Active => "active",
            Self::PaidOff => "paid_off",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Loan ID.
    pub id: LoanId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Borrower's account.
    pub borrower: AccountId,
    /// Principal.
    pub amount: Decimal,
    /// Term in weeks.
    pub term_weeks: u32,
    /// Flat interest rate over the term.
    pub interest_rate: Decimal,
    /// Principal plus interest.
    pub total_repayable: Decimal,
    /// Scheduled installment.
    pub weekly_payment: Decimal,
    /// `total_repayable` minus all payments so far.
    pub outstanding_balance: Decimal,
    /// Lifecycle status.
    pub status: LoanStatus,
    /// Next scheduled installment, while active.
    pub next_payment_date: Option<NaiveDate>,
    /// Date of the last scheduled installment.
    pub due_date: Option<NaiveDate>,
    /// Teacher who approved or denied.
    pub decided_by: Option<UserId>,
    /// Application timestamp.
    pub created_at: DateTime<Utc>,
    /// Approval timestamp.
    pub approved_at: Option<DateTime<Utc>>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Whether a payment came from the weekly run or the borrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Weekly settlement.
    Scheduled,
    /// Borrower-initiated.
    Manual,
}

/// Immutable record of one repayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPayment {
    /// Payment ID.
    pub id: LoanPaymentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Repaid loan.
    pub loan_id: LoanId,
    /// Ledger transaction that moved the money.
    pub transaction_id: TransactionId,
    /// Amount repaid.
    pub amount: Decimal,
    /// Origin of the payment.
    pub source: PaymentSource,
    /// Outstanding balance right after this payment.
    pub outstanding_after: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Terms computed for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    /// Principal.
    pub amount: Decimal,
    /// Term in weeks.
    pub term_weeks: u32,
    /// Rate picked from the interest tiers.
    pub interest_rate: Decimal,
    /// `round2(amount * (1 + rate))`.
    pub total_repayable: Decimal,
    /// `ceil2(total / term)`.
    pub weekly_payment: Decimal,
}

/// A loan settled by the weekly run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledLoan {
    /// Settled loan.
    pub loan_id: LoanId,
    /// Installment taken.
    pub amount: Decimal,
    /// Outstanding after the installment.
    pub outstanding_after: Decimal,
    /// True if this installment closed the loan.
    pub paid_off: bool,
}

/// A loan the weekly run could not settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailure {
    /// Loan that failed.
    pub loan_id: LoanId,
    /// Tenant of the loan.
    pub tenant_id: TenantId,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Outcome of one settlement batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Installments taken.
    pub settled: Vec<SettledLoan>,
    /// Loans skipped because they were no longer due when locked.
    pub skipped: usize,
    /// Per-loan failures; the batch continued past them.
    pub failures: Vec<SettlementFailure>,
}

/// Cached versus derived outstanding balance of one loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    /// Loan checked.
    pub loan_id: LoanId,
    /// Status at the time of the check.
    pub status: LoanStatus,
    /// Stored `outstanding_balance`.
    pub cached_outstanding: Decimal,
    /// `total_repayable` minus the payment sum.
    pub derived_outstanding: Decimal,
    /// True when the two agree within one cent.
    pub consistent: bool,
}

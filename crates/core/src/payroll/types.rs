//! Payroll domain types.

use chrono::{DateTime, NaiveDate, Utc};
use classbank_shared::types::{
    AccountId, PayrollRunId, TaxTransactionId, TenantId, TreasuryTransactionId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A job held by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    /// Job title.
    pub job_title: String,
    /// Weekly pay at level 1.
    pub base_pay: Decimal,
    /// Seniority level, starting at 1.
    pub level: u32,
    /// Contract jobs pay a 50% premium.
    pub contractual: bool,
}

/// One student on a class roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    /// Student's account.
    pub account_id: AccountId,
    /// Student's user.
    pub user_id: UserId,
    /// Current job, if any.
    pub employment: Option<Employment>,
}

/// Which payroll a run pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollKind {
    /// Job salaries, taxed.
    Salary,
    /// Flat basic salary for students without a job, untaxed.
    Basic,
}

impl PayrollKind {
    /// Returns the kind as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Basic => "basic",
        }
    }
}

/// Record of a completed payroll; unique per (tenant, class, kind, week).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRun {
    /// Run ID.
    pub id: PayrollRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Paid class.
    pub class_name: String,
    /// Salary or basic.
    pub kind: PayrollKind,
    /// Monday of the ISO week paid.
    pub period_start: NaiveDate,
    /// Sum of gross pay.
    pub total_gross: Decimal,
    /// Sum of tax retained.
    pub total_tax: Decimal,
    /// Sum of net pay credited.
    pub total_net: Decimal,
    /// Number of students credited.
    pub paid_count: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Tax withheld from one student in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTransaction {
    /// Tax transaction ID.
    pub id: TaxTransactionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Taxed account.
    pub account_id: AccountId,
    /// Run the tax belongs to.
    pub payroll_run_id: PayrollRunId,
    /// Retention row of the run.
    pub treasury_transaction_id: TreasuryTransactionId,
    /// Gross pay.
    pub gross: Decimal,
    /// Tax withheld.
    pub tax: Decimal,
    /// Net pay credited.
    pub net: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Computed pay for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaySlip {
    /// Paid account.
    pub account_id: AccountId,
    /// Paid user.
    pub user_id: UserId,
    /// Gross pay.
    pub gross: Decimal,
    /// Tax withheld.
    pub tax: Decimal,
    /// `gross - tax`.
    pub net: Decimal,
}

/// Outcome of a payroll run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollReport {
    /// The stored run.
    pub run: PayrollRun,
    /// Pay per student.
    pub slips: Vec<PaySlip>,
    /// Class treasury balance after the run.
    pub treasury_balance: Decimal,
}

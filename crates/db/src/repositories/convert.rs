//! Conversions between entity models and domain types.

use chrono::{DateTime, FixedOffset, Utc};
use classbank_core::earnings::types::{Difficulty, GameSession, Problem, SessionStatus};
use classbank_core::ledger::types::{
    Account, Transaction, TransactionKind, Treasury, TreasuryFlow, TreasuryScope,
    TreasuryTransaction,
};
use classbank_core::loan::types::{Loan, LoanPayment, LoanStatus, PaymentSource};
use classbank_core::payroll::types::{
    Employment, PayrollKind, PayrollRun, RosterMember, TaxTransaction,
};
use classbank_core::settings::{TaxBracket, TownSettings};
use classbank_core::store::StoreError;
use classbank_shared::types::{
    AccountId, GameSessionId, LoanId, LoanPaymentId, PayrollRunId, TaxTransactionId, TenantId,
    TransactionId, TreasuryId, TreasuryTransactionId, UserId,
};
use rust_decimal::Decimal;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};

use crate::entities::sea_orm_active_enums as db_enums;
use crate::entities::{
    accounts, class_members, game_sessions, loan_payments, loans, payroll_runs, tax_transactions,
    town_settings, transactions, treasuries, treasury_transactions,
};

/// Postgres SQLSTATE for `lock_not_available`.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Maps a database error onto the store's error type.
pub fn store_err(err: DbErr) -> StoreError {
    let message = err.to_string();
    if message.contains(LOCK_NOT_AVAILABLE) || message.contains("lock timeout") {
        return StoreError::LockTimeout;
    }
    if let Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return StoreError::Conflict(detail);
    }
    StoreError::Database(message)
}

pub(crate) fn utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn offset(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.fixed_offset()
}

fn count(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Database(format!("negative {column}: {value}")))
}

pub(crate) fn int(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Database(format!("{column} too large: {value}")))
}

pub(crate) fn scope(value: &str) -> Result<TreasuryScope, StoreError> {
    value.parse().map_err(StoreError::Database)
}

// ============================================================
// ENUMS
// ============================================================

impl From<TransactionKind> for db_enums::TransactionKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Deposit => Self::Deposit,
            TransactionKind::Withdrawal => Self::Withdrawal,
            TransactionKind::Transfer => Self::Transfer,
            TransactionKind::Purchase => Self::Purchase,
            TransactionKind::Fine => Self::Fine,
            TransactionKind::Salary => Self::Salary,
            TransactionKind::BasicSalary => Self::BasicSalary,
            TransactionKind::GameEarnings => Self::GameEarnings,
            TransactionKind::LoanDisbursement => Self::LoanDisbursement,
            TransactionKind::LoanRepayment => Self::LoanRepayment,
            TransactionKind::Tax => Self::Tax,
        }
    }
}

impl From<db_enums::TransactionKind> for TransactionKind {
    fn from(kind: db_enums::TransactionKind) -> Self {
        match kind {
            db_enums::TransactionKind::Deposit => Self::Deposit,
            db_enums::TransactionKind::Withdrawal => Self::Withdrawal,
            db_enums::TransactionKind::Transfer => Self::Transfer,
            db_enums::TransactionKind::Purchase => Self::Purchase,
            db_enums::TransactionKind::Fine => Self::Fine,
            db_enums::TransactionKind::Salary => Self::Salary,
            db_enums::TransactionKind::BasicSalary => Self::BasicSalary,
            db_enums::TransactionKind::GameEarnings => Self::GameEarnings,
            db_enums::TransactionKind::LoanDisbursement => Self::LoanDisbursement,
            db_enums::TransactionKind::LoanRepayment => Self::LoanRepayment,
            db_enums::TransactionKind::Tax => Self::Tax,
        }
    }
}

impl From<TreasuryFlow> for db_enums::TreasuryFlow {
    fn from(flow: TreasuryFlow) -> Self {
        match flow {
            TreasuryFlow::Inflow => Self::Inflow,
            TreasuryFlow::Outflow => Self::Outflow,
            TreasuryFlow::Retention => Self::Retention,
        }
    }
}

impl From<db_enums::TreasuryFlow> for TreasuryFlow {
    fn from(flow: db_enums::TreasuryFlow) -> Self {
        match flow {
            db_enums::TreasuryFlow::Inflow => Self::Inflow,
            db_enums::TreasuryFlow::Outflow => Self::Outflow,
            db_enums::TreasuryFlow::Retention => Self::Retention,
        }
    }
}

impl From<LoanStatus> for db_enums::LoanStatus {
    fn from(status: LoanStatus) -> Self {
        match status {
            LoanStatus::Pending => Self::Pending,
            LoanStatus::Approved => Self::Approved,
            LoanStatus::Denied => Self::Denied,
            LoanStatus::Active => Self::Active,
            LoanStatus::PaidOff => Self::PaidOff,
        }
    }
}

impl From<db_enums::LoanStatus> for LoanStatus {
    fn from(status: db_enums::LoanStatus) -> Self {
        match status {
            db_enums::LoanStatus::Pending => Self::Pending,
            db_enums::LoanStatus::Approved => Self::Approved,
            db_enums::LoanStatus::Denied => Self::Denied,
            db_enums::LoanStatus::Active => Self::Active,
            db_enums::LoanStatus::PaidOff => Self::PaidOff,
        }
    }
}

impl From<PaymentSource> for db_enums::PaymentSource {
    fn from(source: PaymentSource) -> Self {
        match source {
            PaymentSource::Scheduled => Self::Scheduled,
            PaymentSource::Manual => Self::Manual,
        }
    }
}

impl From<db_enums::PaymentSource> for PaymentSource {
    fn from(source: db_enums::PaymentSource) -> Self {
        match source {
            db_enums::PaymentSource::Scheduled => Self::Scheduled,
            db_enums::PaymentSource::Manual => Self::Manual,
        }
    }
}

impl From<SessionStatus> for db_enums::SessionStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Open => Self::Open,
            SessionStatus::Credited => Self::Credited,
            SessionStatus::Completed => Self::Completed,
            SessionStatus::Rejected => Self::Rejected,
        }
    }
}

impl From<db_enums::SessionStatus> for SessionStatus {
    fn from(status: db_enums::SessionStatus) -> Self {
        match status {
            db_enums::SessionStatus::Open => Self::Open,
            db_enums::SessionStatus::Credited => Self::Credited,
            db_enums::SessionStatus::Completed => Self::Completed,
            db_enums::SessionStatus::Rejected => Self::Rejected,
        }
    }
}

impl From<Difficulty> for db_enums::Difficulty {
    fn from(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self::Easy,
            Difficulty::Medium => Self::Medium,
            Difficulty::Hard => Self::Hard,
        }
    }
}

impl From<db_enums::Difficulty> for Difficulty {
    fn from(difficulty: db_enums::Difficulty) -> Self {
        match difficulty {
            db_enums::Difficulty::Easy => Self::Easy,
            db_enums::Difficulty::Medium => Self::Medium,
            db_enums::Difficulty::Hard => Self::Hard,
        }
    }
}

impl From<PayrollKind> for db_enums::PayrollKind {
    fn from(kind: PayrollKind) -> Self {
        match kind {
            PayrollKind::Salary => Self::Salary,
            PayrollKind::Basic => Self::Basic,
        }
    }
}

impl From<db_enums::PayrollKind> for PayrollKind {
    fn from(kind: db_enums::PayrollKind) -> Self {
        match kind {
            db_enums::PayrollKind::Salary => Self::Salary,
            db_enums::PayrollKind::Basic => Self::Basic,
        }
    }
}

// ============================================================
// ROWS
// ============================================================

impl From<accounts::Model> for Account {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: AccountId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            user_id: UserId::from_uuid(model.user_id),
            balance: model.balance,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

impl TryFrom<treasuries::Model> for Treasury {
    type Error = StoreError;

    fn try_from(model: treasuries::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TreasuryId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            scope: scope(&model.scope)?,
            balance: model.balance,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        })
    }
}

impl From<transactions::Model> for Transaction {
    fn from(model: transactions::Model) -> Self {
        Self {
            id: TransactionId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            from_account: model.from_account.map(AccountId::from_uuid),
            to_account: model.to_account.map(AccountId::from_uuid),
            amount: model.amount,
            kind: model.kind.into(),
            description: model.description,
            created_at: utc(model.created_at),
        }
    }
}

pub(crate) fn transaction_row(tx: &Transaction) -> transactions::ActiveModel {
    use sea_orm::Set;
    transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        tenant_id: Set(tx.tenant_id.into_inner()),
        from_account: Set(tx.from_account.map(AccountId::into_inner)),
        to_account: Set(tx.to_account.map(AccountId::into_inner)),
        amount: Set(tx.amount),
        kind: Set(tx.kind.into()),
        description: Set(tx.description.clone()),
        created_at: Set(offset(tx.created_at)),
    }
}

impl TryFrom<treasury_transactions::Model> for TreasuryTransaction {
    type Error = StoreError;

    fn try_from(model: treasury_transactions::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TreasuryTransactionId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            treasury_id: TreasuryId::from_uuid(model.treasury_id),
            scope: scope(&model.scope)?,
            flow: model.flow.into(),
            amount: model.amount,
            kind: model.kind.into(),
            description: model.description,
            counterparty_account: model.counterparty_account.map(AccountId::from_uuid),
            payroll_run_id: model.payroll_run_id.map(PayrollRunId::from_uuid),
            created_at: utc(model.created_at),
        })
    }
}

pub(crate) fn treasury_transaction_row(
    tx: &TreasuryTransaction,
) -> treasury_transactions::ActiveModel {
    use sea_orm::Set;
    treasury_transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        tenant_id: Set(tx.tenant_id.into_inner()),
        treasury_id: Set(tx.treasury_id.into_inner()),
        scope: Set(tx.scope.to_string()),
        flow: Set(tx.flow.into()),
        amount: Set(tx.amount),
        kind: Set(tx.kind.into()),
        description: Set(tx.description.clone()),
        counterparty_account: Set(tx.counterparty_account.map(AccountId::into_inner)),
        payroll_run_id: Set(tx.payroll_run_id.map(PayrollRunId::into_inner)),
        created_at: Set(offset(tx.created_at)),
    }
}

impl From<tax_transactions::Model> for TaxTransaction {
    fn from(model: tax_transactions::Model) -> Self {
        Self {
            id: TaxTransactionId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            account_id: AccountId::from_uuid(model.account_id),
            payroll_run_id: PayrollRunId::from_uuid(model.payroll_run_id),
            treasury_transaction_id: TreasuryTransactionId::from_uuid(
                model.treasury_transaction_id,
            ),
            gross: model.gross,
            tax: model.tax,
            net: model.net,
            created_at: utc(model.created_at),
        }
    }
}

pub(crate) fn tax_transaction_row(tx: &TaxTransaction) -> tax_transactions::ActiveModel {
    use sea_orm::Set;
    tax_transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        tenant_id: Set(tx.tenant_id.into_inner()),
        account_id: Set(tx.account_id.into_inner()),
        payroll_run_id: Set(tx.payroll_run_id.into_inner()),
        treasury_transaction_id: Set(tx.treasury_transaction_id.into_inner()),
        gross: Set(tx.gross),
        tax: Set(tx.tax),
        net: Set(tx.net),
        created_at: Set(offset(tx.created_at)),
    }
}

impl TryFrom<loans::Model> for Loan {
    type Error = StoreError;

    fn try_from(model: loans::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: LoanId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            borrower: AccountId::from_uuid(model.borrower),
            amount: model.amount,
            term_weeks: count(model.term_weeks, "term_weeks")?,
            interest_rate: model.interest_rate,
            total_repayable: model.total_repayable,
            weekly_payment: model.weekly_payment,
            outstanding_balance: model.outstanding_balance,
            status: model.status.into(),
            next_payment_date: model.next_payment_date,
            due_date: model.due_date,
            decided_by: model.decided_by.map(UserId::from_uuid),
            created_at: utc(model.created_at),
            approved_at: model.approved_at.map(utc),
            updated_at: utc(model.updated_at),
        })
    }
}

pub(crate) fn loan_row(loan: &Loan) -> Result<loans::ActiveModel, StoreError> {
    use sea_orm::Set;
    Ok(loans::ActiveModel {
        id: Set(loan.id.into_inner()),
        tenant_id: Set(loan.tenant_id.into_inner()),
        borrower: Set(loan.borrower.into_inner()),
        amount: Set(loan.amount),
        term_weeks: Set(int(loan.term_weeks, "term_weeks")?),
        interest_rate: Set(loan.interest_rate),
        total_repayable: Set(loan.total_repayable),
        weekly_payment: Set(loan.weekly_payment),
        outstanding_balance: Set(loan.outstanding_balance),
        status: Set(loan.status.into()),
        next_payment_date: Set(loan.next_payment_date),
        due_date: Set(loan.due_date),
        decided_by: Set(loan.decided_by.map(UserId::into_inner)),
        created_at: Set(offset(loan.created_at)),
        approved_at: Set(loan.approved_at.map(offset)),
        updated_at: Set(offset(loan.updated_at)),
    })
}

impl From<loan_payments::Model> for LoanPayment {
    fn from(model: loan_payments::Model) -> Self {
        Self {
            id: LoanPaymentId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            loan_id: LoanId::from_uuid(model.loan_id),
            transaction_id: TransactionId::from_uuid(model.transaction_id),
            amount: model.amount,
            source: model.source.into(),
            outstanding_after: model.outstanding_after,
            created_at: utc(model.created_at),
        }
    }
}

pub(crate) fn loan_payment_row(payment: &LoanPayment) -> loan_payments::ActiveModel {
    use sea_orm::Set;
    loan_payments::ActiveModel {
        id: Set(payment.id.into_inner()),
        tenant_id: Set(payment.tenant_id.into_inner()),
        loan_id: Set(payment.loan_id.into_inner()),
        transaction_id: Set(payment.transaction_id.into_inner()),
        amount: Set(payment.amount),
        source: Set(payment.source.into()),
        outstanding_after: Set(payment.outstanding_after),
        created_at: Set(offset(payment.created_at)),
    }
}

impl TryFrom<game_sessions::Model> for GameSession {
    type Error = StoreError;

    fn try_from(model: game_sessions::Model) -> Result<Self, Self::Error> {
        let problems: Vec<Problem> = serde_json::from_value(model.problems)
            .map_err(|e| StoreError::Database(format!("session problems: {e}")))?;
        Ok(Self {
            id: GameSessionId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            user_id: UserId::from_uuid(model.user_id),
            account_id: AccountId::from_uuid(model.account_id),
            class_name: model.class_name,
            game: model.game,
            difficulty: model.difficulty.into(),
            problems,
            status: model.status.into(),
            started_at: utc(model.started_at),
            submitted_at: model.submitted_at.map(utc),
            earnings: model.earnings,
            rejection_code: model.rejection_code,
        })
    }
}

pub(crate) fn session_row(session: &GameSession) -> Result<game_sessions::ActiveModel, StoreError> {
    use sea_orm::Set;
    let problems = serde_json::to_value(&session.problems)
        .map_err(|e| StoreError::Database(format!("session problems: {e}")))?;
    Ok(game_sessions::ActiveModel {
        id: Set(session.id.into_inner()),
        tenant_id: Set(session.tenant_id.into_inner()),
        user_id: Set(session.user_id.into_inner()),
        account_id: Set(session.account_id.into_inner()),
        class_name: Set(session.class_name.clone()),
        game: Set(session.game.clone()),
        difficulty: Set(session.difficulty.into()),
        problems: Set(problems),
        status: Set(session.status.into()),
        started_at: Set(offset(session.started_at)),
        submitted_at: Set(session.submitted_at.map(offset)),
        earnings: Set(session.earnings),
        rejection_code: Set(session.rejection_code.clone()),
    })
}

impl TryFrom<payroll_runs::Model> for PayrollRun {
    type Error = StoreError;

    fn try_from(model: payroll_runs::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PayrollRunId::from_uuid(model.id),
            tenant_id: TenantId::from_uuid(model.tenant_id),
            class_name: model.class_name,
            kind: model.kind.into(),
            period_start: model.period_start,
            total_gross: model.total_gross,
            total_tax: model.total_tax,
            total_net: model.total_net,
            paid_count: count(model.paid_count, "paid_count")?,
            created_at: utc(model.created_at),
        })
    }
}

pub(crate) fn payroll_run_row(run: &PayrollRun) -> Result<payroll_runs::ActiveModel, StoreError> {
    use sea_orm::Set;
    Ok(payroll_runs::ActiveModel {
        id: Set(run.id.into_inner()),
        tenant_id: Set(run.tenant_id.into_inner()),
        class_name: Set(run.class_name.clone()),
        kind: Set(run.kind.into()),
        period_start: Set(run.period_start),
        total_gross: Set(run.total_gross),
        total_tax: Set(run.total_tax),
        total_net: Set(run.total_net),
        paid_count: Set(int(run.paid_count, "paid_count")?),
        created_at: Set(offset(run.created_at)),
    })
}

impl TryFrom<class_members::Model> for RosterMember {
    type Error = StoreError;

    fn try_from(model: class_members::Model) -> Result<Self, Self::Error> {
        let employment = match (model.job_title, model.base_pay, model.level) {
            (Some(job_title), Some(base_pay), Some(level)) => Some(Employment {
                job_title,
                base_pay,
                level: count(level, "level")?,
                contractual: model.contractual,
            }),
            _ => None,
        };
        Ok(Self {
            account_id: AccountId::from_uuid(model.account_id),
            user_id: UserId::from_uuid(model.user_id),
            employment,
        })
    }
}

/// Bracket as stored in `town_settings.tax_brackets`.
#[derive(Debug, Serialize, Deserialize)]
struct BracketRow {
    from: Decimal,
    rate: Decimal,
}

impl TryFrom<town_settings::Model> for TownSettings {
    type Error = StoreError;

    fn try_from(model: town_settings::Model) -> Result<Self, Self::Error> {
        let rows: Vec<BracketRow> = serde_json::from_value(model.tax_brackets)
            .map_err(|e| StoreError::InvalidSettings(format!("tax_brackets: {e}")))?;
        let mut tax_brackets: Vec<TaxBracket> = rows
            .into_iter()
            .map(|row| TaxBracket {
                from: row.from,
                rate: row.rate,
            })
            .collect();
        tax_brackets.sort_by_key(|bracket| bracket.from);
        Ok(Self {
            taxation_enabled: model.taxation_enabled,
            tax_brackets,
            basic_salary: model.basic_salary,
        })
    }
}

/// JSON stored for `brackets`.
pub(crate) fn brackets_json(brackets: &[TaxBracket]) -> Result<serde_json::Value, StoreError> {
    let rows: Vec<BracketRow> = brackets
        .iter()
        .map(|bracket| BracketRow {
            from: bracket.from,
            rate: bracket.rate,
        })
        .collect();
    serde_json::to_value(rows).map_err(|e| StoreError::InvalidSettings(e.to_string()))
}

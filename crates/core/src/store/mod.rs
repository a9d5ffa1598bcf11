//! Storage seams: typed read repositories and the `LedgerStore` unit of work.
//!
//! Every balance change happens inside a [`LedgerUnit`]. A unit locks the rows
//! it touches in the global order defined by [`LockKey`], writes, and then
//! commits or rolls back as a whole. Dropping a unit without committing rolls
//! it back.
//!
//! Repository reads never block and only observe committed units.

pub mod error;
pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use classbank_shared::types::{
    AccountId, GameSessionId, LoanId, PageRequest, PageResponse, PayrollRunId, TenantId, UserId,
};
use rust_decimal::Decimal;

use crate::earnings::types::GameSession;
use crate::ledger::types::{Account, Transaction, Treasury, TreasuryKey, TreasuryTransaction};
use crate::loan::types::{Loan, LoanPayment};
use crate::payroll::types::{Employment, PayrollKind, PayrollRun, RosterMember, TaxTransaction};

pub use error::StoreError;
pub use memory::MemoryStore;

/// Lockable row. The derived order is the global lock order:
/// sessions, then loans, then treasuries, then accounts, ascending within a kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// A game session.
    Session(GameSessionId),
    /// A loan.
    Loan(LoanId),
    /// A treasury, by natural key.
    Treasury(TreasuryKey),
    /// A student account.
    Account(AccountId),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Loan(id) => write!(f, "loan:{id}"),
            Self::Treasury(key) => write!(f, "treasury:{}:{}", key.tenant_id, key.scope),
            Self::Account(id) => write!(f, "account:{id}"),
        }
    }
}

/// Row locks taken by one unit, in acquisition order.
#[derive(Debug, Default)]
pub struct HeldLocks {
    held: HashSet<LockKey>,
    highest: Option<LockKey>,
}

impl HeldLocks {
    /// Decides whether `key` must be acquired: `false` if already held.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockOrder` if `key` sorts below a held lock.
    pub fn admit(&self, key: &LockKey) -> Result<bool, StoreError> {
        if self.held.contains(key) {
            return Ok(false);
        }
        match &self.highest {
            Some(highest) if key < highest => Err(StoreError::LockOrder {
                held: highest.to_string(),
                requested: key.to_string(),
            }),
            _ => Ok(true),
        }
    }

    /// True if the unit holds `key`.
    #[must_use]
    pub fn holds(&self, key: &LockKey) -> bool {
        self.held.contains(key)
    }

    /// Records a lock the unit now holds.
    pub fn record(&mut self, key: LockKey) {
        self.held.insert(key.clone());
        if self.highest.as_ref().is_none_or(|highest| key > *highest) {
            self.highest = Some(key);
        }
    }
}

/// Opens units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Starts a new unit.
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError>;
}

/// One atomic unit of work.
///
/// `lock_*` methods must be called in ascending [`LockKey`] order; locking a
/// row the unit already holds returns the unit's current copy.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Locks an account of `tenant`. `None` if it does not exist there.
    async fn lock_account(
        &mut self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Locks a treasury, creating an empty one on first use.
    async fn lock_treasury(&mut self, key: &TreasuryKey) -> Result<Treasury, StoreError>;

    /// Locks a loan of `tenant`.
    async fn lock_loan(&mut self, tenant: TenantId, id: LoanId)
    -> Result<Option<Loan>, StoreError>;

    /// Locks a game session of `tenant`.
    async fn lock_session(
        &mut self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError>;

    /// Writes a locked account's balance.
    async fn set_account_balance(
        &mut self,
        id: AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Writes a locked treasury's balance.
    async fn set_treasury_balance(
        &mut self,
        key: &TreasuryKey,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Appends to the transaction log.
    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), StoreError>;

    /// Appends to the treasury transaction log.
    async fn insert_treasury_transaction(
        &mut self,
        tx: &TreasuryTransaction,
    ) -> Result<(), StoreError>;

    /// Appends a tax record.
    async fn insert_tax_transaction(&mut self, tx: &TaxTransaction) -> Result<(), StoreError>;

    /// Loans of `borrower` in a non-terminal state, including ones written by this unit.
    async fn open_loans_for(
        &mut self,
        tenant: TenantId,
        borrower: AccountId,
    ) -> Result<Vec<Loan>, StoreError>;

    /// Inserts a new loan.
    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), StoreError>;

    /// Writes a locked loan.
    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError>;

    /// Appends a loan payment.
    async fn insert_loan_payment(&mut self, payment: &LoanPayment) -> Result<(), StoreError>;

    /// Sum of all payments on `loan`, including ones written by this unit.
    async fn loan_payments_total(&mut self, loan: LoanId) -> Result<Decimal, StoreError>;

    /// Timestamp of the latest manual payment on `loan`.
    async fn last_manual_payment_at(
        &mut self,
        loan: LoanId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Writes a locked session.
    async fn update_session(&mut self, session: &GameSession) -> Result<(), StoreError>;

    /// Submissions by `user` counting as plays since `since`.
    async fn count_plays_since(
        &mut self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Existing payroll run for the class, kind, and period.
    async fn find_payroll_run(
        &mut self,
        tenant: TenantId,
        class_name: &str,
        kind: PayrollKind,
        period_start: NaiveDate,
    ) -> Result<Option<PayrollRun>, StoreError>;

    /// Records a payroll run.
    async fn insert_payroll_run(&mut self, run: &PayrollRun) -> Result<(), StoreError>;

    /// Makes every write of the unit visible and releases its locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write of the unit and releases its locks.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Rolls back a unit after a failed operation. A failing rollback is only
/// logged; the caller reports the original error.
pub async fn abandon(unit: Box<dyn LedgerUnit>) {
    if let Err(e) = unit.rollback().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}

/// Commits `unit` if `result` is `Ok`, otherwise rolls it back, and hands
/// `result` back.
pub async fn complete<T, E>(unit: Box<dyn LedgerUnit>, result: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match result {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(e) => {
            abandon(unit).await;
            Err(e)
        }
    }
}

/// Account reads and registration.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Opens the account of `user`; returns the existing one on repeat calls.
    async fn open_account(&self, tenant: TenantId, user: UserId) -> Result<Account, StoreError>;

    /// Finds an account by ID.
    async fn find_account(
        &self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Finds the account of a user.
    async fn find_account_by_user(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<Account>, StoreError>;

    /// Transactions touching an account, newest first.
    async fn list_transactions(
        &self,
        tenant: TenantId,
        account: AccountId,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, StoreError>;
}

/// Treasury reads.
#[async_trait]
pub trait TreasuryRepository: Send + Sync {
    /// Finds a treasury by key.
    async fn find_treasury(&self, key: &TreasuryKey) -> Result<Option<Treasury>, StoreError>;

    /// Treasury transactions of one treasury, newest first.
    async fn list_treasury_transactions(
        &self,
        key: &TreasuryKey,
        page: PageRequest,
    ) -> Result<PageResponse<TreasuryTransaction>, StoreError>;

    /// Tax records of a payroll run.
    async fn list_tax_transactions(
        &self,
        tenant: TenantId,
        run: PayrollRunId,
    ) -> Result<Vec<TaxTransaction>, StoreError>;
}

/// Loan reads.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Finds a loan by ID.
    async fn find_loan(&self, tenant: TenantId, id: LoanId) -> Result<Option<Loan>, StoreError>;

    /// Loans of a tenant, optionally for one borrower, newest first.
    async fn list_loans(
        &self,
        tenant: TenantId,
        borrower: Option<AccountId>,
    ) -> Result<Vec<Loan>, StoreError>;

    /// Active loans with `next_payment_date <= today`, for one tenant or all.
    async fn due_loans(
        &self,
        tenant: Option<TenantId>,
        today: NaiveDate,
    ) -> Result<Vec<Loan>, StoreError>;

    /// Payments of a loan, oldest first.
    async fn loan_payments(
        &self,
        tenant: TenantId,
        loan: LoanId,
    ) -> Result<Vec<LoanPayment>, StoreError>;
}

/// Game session storage outside of units.
#[async_trait]
pub trait GameSessionRepository: Send + Sync {
    /// Stores a freshly started session.
    async fn create_session(&self, session: &GameSession) -> Result<(), StoreError>;

    /// Finds a session by ID.
    async fn find_session(
        &self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError>;
}

/// Class membership and jobs, maintained by the roster owner.
#[async_trait]
pub trait RosterRepository: Send + Sync {
    /// Members of a class.
    async fn class_roster(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<Vec<RosterMember>, StoreError>;

    /// Job held by the owner of `account`.
    async fn employment_for(
        &self,
        tenant: TenantId,
        account: AccountId,
    ) -> Result<Option<Employment>, StoreError>;

    /// Adds or replaces a class member.
    async fn enroll(
        &self,
        tenant: TenantId,
        class_name: &str,
        member: &RosterMember,
    ) -> Result<(), StoreError>;
}

/// Everything the services need from one backend.
pub trait EconomyStore:
    LedgerStore
    + AccountRepository
    + TreasuryRepository
    + LoanRepository
    + GameSessionRepository
    + RosterRepository
{
}

impl<T> EconomyStore for T where
    T: LedgerStore
        + AccountRepository
        + TreasuryRepository
        + LoanRepository
        + GameSessionRepository
        + RosterRepository
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::TreasuryScope;

    #[test]
    fn test_lock_order_by_kind() {
        let tenant = TenantId::new();
        let session = LockKey::Session(GameSessionId::new());
        let loan = LockKey::Loan(LoanId::new());
        let treasury = LockKey::Treasury(TreasuryKey::new(tenant, TreasuryScope::Shop));
        let account = LockKey::Account(AccountId::new());

        assert!(session < loan);
        assert!(loan < treasury);
        assert!(treasury < account);
    }

    #[test]
    fn test_lock_order_within_kind() {
        let first = AccountId::new();
        let second = AccountId::new();
        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        assert!(LockKey::Account(low) < LockKey::Account(high));
    }

    #[test]
    fn test_held_locks_reject_lower_key() {
        let mut held = HeldLocks::default();
        let account = LockKey::Account(AccountId::new());
        assert!(held.admit(&account).unwrap());
        held.record(account.clone());

        assert!(!held.admit(&account).unwrap());
        assert!(held.holds(&account));
        let loan = LockKey::Loan(LoanId::new());
        assert!(matches!(
            held.admit(&loan),
            Err(StoreError::LockOrder { .. })
        ));
    }
}

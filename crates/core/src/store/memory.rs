//! In-memory implementation of the store traits.
//!
//! Backs the unit tests and the API tests. Row locks are per-key tokio mutexes
//! held by the unit until commit or rollback; committed state sits behind one
//! `RwLock` and a commit applies every buffered write under a single write guard,
//! so readers see either none or all of a unit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use classbank_shared::types::{
    AccountId, GameSessionId, LoanId, PageRequest, PageResponse, PayrollRunId, TenantId, UserId,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{
    AccountRepository, GameSessionRepository, HeldLocks, LedgerStore, LedgerUnit, LoanRepository,
    LockKey, RosterRepository, StoreError, TreasuryRepository,
};
use crate::earnings::types::GameSession;
use crate::ledger::types::{Account, Transaction, Treasury, TreasuryKey, TreasuryTransaction};
use crate::loan::types::{Loan, LoanPayment, LoanStatus, PaymentSource};
use crate::payroll::types::{Employment, PayrollKind, PayrollRun, RosterMember, TaxTransaction};

/// Default bound on lock waits.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    treasuries: HashMap<TreasuryKey, Treasury>,
    transactions: Vec<Transaction>,
    treasury_transactions: Vec<TreasuryTransaction>,
    tax_transactions: Vec<TaxTransaction>,
    loans: HashMap<LoanId, Loan>,
    loan_payments: Vec<LoanPayment>,
    sessions: HashMap<GameSessionId, GameSession>,
    payroll_runs: Vec<PayrollRun>,
    roster: Vec<(TenantId, String, RosterMember)>,
}

struct Shared {
    state: RwLock<State>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

/// Store keeping everything in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("lock_timeout", &self.shared.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default lock timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store whose lock waits give up after `lock_timeout`.
    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                locks: DashMap::new(),
                lock_timeout,
            }),
        }
    }

    /// Sets a treasury balance directly, creating the row if needed.
    /// Seeding helper; bypasses the ledger and writes no log rows.
    pub async fn seed_treasury(&self, key: &TreasuryKey, balance: Decimal) -> Treasury {
        let mut state = self.shared.state.write().await;
        let now = Utc::now();
        let treasury = state
            .treasuries
            .entry(key.clone())
            .or_insert_with(|| Treasury::empty(key, now));
        treasury.balance = balance;
        treasury.updated_at = now;
        treasury.clone()
    }

    /// Sets an account balance directly. Seeding helper.
    pub async fn seed_account_balance(
        &self,
        id: AccountId,
        balance: Decimal,
    ) -> Result<Account, StoreError> {
        let mut state = self.shared.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.balance = balance;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    /// Number of game sessions stored, any status.
    pub async fn session_count(&self) -> usize {
        self.shared.state.read().await.sessions.len()
    }

    /// Row-lock entries currently kept; zero when no unit holds or awaits one.
    #[must_use]
    pub fn lock_entries(&self) -> usize {
        self.shared.locks.len()
    }
}

/// Row guards held by one unit.
///
/// Releasing drops each guard and evicts its lock entry unless another unit
/// is still holding or waiting on it.
struct RowGuards {
    shared: Arc<Shared>,
    held: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl RowGuards {
    fn push(&mut self, key: LockKey, guard: OwnedMutexGuard<()>) {
        self.held.push((key, guard));
    }
}

impl Drop for RowGuards {
    fn drop(&mut self) {
        for (key, guard) in self.held.drain(..) {
            drop(guard);
            self.shared
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> PageResponse<T> {
    let page = page.clamped();
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    let data = items.iter().skip(offset).take(limit).cloned().collect();
    PageResponse::new(data, page, items.len() as u64)
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        Ok(Box::new(MemoryUnit::new(Arc::clone(&self.shared))))
    }
}

/// Unit of work over [`MemoryStore`].
///
/// Locked rows are copied into the unit and edited there; inserts are buffered.
struct MemoryUnit {
    shared: Arc<Shared>,
    guards: RowGuards,
    held: HeldLocks,
    accounts: HashMap<AccountId, Account>,
    treasuries: HashMap<TreasuryKey, Treasury>,
    loans: HashMap<LoanId, Loan>,
    sessions: HashMap<GameSessionId, GameSession>,
    new_loans: Vec<Loan>,
    transactions: Vec<Transaction>,
    treasury_transactions: Vec<TreasuryTransaction>,
    tax_transactions: Vec<TaxTransaction>,
    loan_payments: Vec<LoanPayment>,
    payroll_runs: Vec<PayrollRun>,
}

impl MemoryUnit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            guards: RowGuards {
                shared: Arc::clone(&shared),
                held: Vec::new(),
            },
            shared,
            held: HeldLocks::default(),
            accounts: HashMap::new(),
            treasuries: HashMap::new(),
            loans: HashMap::new(),
            sessions: HashMap::new(),
            new_loans: Vec::new(),
            transactions: Vec::new(),
            treasury_transactions: Vec::new(),
            tax_transactions: Vec::new(),
            loan_payments: Vec::new(),
            payroll_runs: Vec::new(),
        }
    }

    /// Takes the row lock for `key`. Returns false if the unit already held it.
    async fn acquire(&mut self, key: LockKey) -> Result<bool, StoreError> {
        if !self.held.admit(&key)? {
            return Ok(false);
        }

        let mutex = self
            .shared
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = tokio::time::timeout(self.shared.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;

        self.guards.push(key.clone(), guard);
        self.held.record(key);
        Ok(true)
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn lock_account(
        &mut self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        if self.acquire(LockKey::Account(id)).await? {
            let found = self.shared.state.read().await.accounts.get(&id).cloned();
            if let Some(account) = found {
                self.accounts.insert(id, account);
            }
        }
        Ok(self
            .accounts
            .get(&id)
            .filter(|account| account.tenant_id == tenant)
            .cloned())
    }

    async fn lock_treasury(&mut self, key: &TreasuryKey) -> Result<Treasury, StoreError> {
        self.acquire(LockKey::Treasury(key.clone())).await?;
        if let Some(treasury) = self.treasuries.get(key) {
            return Ok(treasury.clone());
        }
        let existing = self.shared.state.read().await.treasuries.get(key).cloned();
        let treasury = existing.unwrap_or_else(|| Treasury::empty(key, Utc::now()));
        self.treasuries.insert(key.clone(), treasury.clone());
        Ok(treasury)
    }

    async fn lock_loan(
        &mut self,
        tenant: TenantId,
        id: LoanId,
    ) -> Result<Option<Loan>, StoreError> {
        if self.acquire(LockKey::Loan(id)).await? {
            let found = self.shared.state.read().await.loans.get(&id).cloned();
            if let Some(loan) = found {
                self.loans.insert(id, loan);
            }
        }
        Ok(self
            .loans
            .get(&id)
            .filter(|loan| loan.tenant_id == tenant)
            .cloned())
    }

    async fn lock_session(
        &mut self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError> {
        if self.acquire(LockKey::Session(id)).await? {
            let found = self.shared.state.read().await.sessions.get(&id).cloned();
            if let Some(session) = found {
                self.sessions.insert(id, session);
            }
        }
        Ok(self
            .sessions
            .get(&id)
            .filter(|session| session.tenant_id == tenant)
            .cloned())
    }

    async fn set_account_balance(
        &mut self,
        id: AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotLocked(LockKey::Account(id).to_string()))?;
        account.balance = balance;
        account.updated_at = at;
        Ok(())
    }

    async fn set_treasury_balance(
        &mut self,
        key: &TreasuryKey,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let treasury = self
            .treasuries
            .get_mut(key)
            .ok_or_else(|| StoreError::NotLocked(LockKey::Treasury(key.clone()).to_string()))?;
        treasury.balance = balance;
        treasury.updated_at = at;
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        self.transactions.push(tx.clone());
        Ok(())
    }

    async fn insert_treasury_transaction(
        &mut self,
        tx: &TreasuryTransaction,
    ) -> Result<(), StoreError> {
        self.treasury_transactions.push(tx.clone());
        Ok(())
    }

    async fn insert_tax_transaction(&mut self, tx: &TaxTransaction) -> Result<(), StoreError> {
        self.tax_transactions.push(tx.clone());
        Ok(())
    }

    async fn open_loans_for(
        &mut self,
        tenant: TenantId,
        borrower: AccountId,
    ) -> Result<Vec<Loan>, StoreError> {
        let state = self.shared.state.read().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .map(|loan| self.loans.get(&loan.id).unwrap_or(loan))
            .chain(self.new_loans.iter())
            .filter(|loan| loan.tenant_id == tenant && loan.borrower == borrower)
            .filter(|loan| loan.status.is_open())
            .cloned()
            .collect();
        loans.sort_by_key(|loan| loan.created_at);
        Ok(loans)
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        let exists = self.shared.state.read().await.loans.contains_key(&loan.id)
            || self.new_loans.iter().any(|pending| pending.id == loan.id);
        if exists {
            return Err(StoreError::Conflict(format!("loan {} already exists", loan.id)));
        }
        self.new_loans.push(loan.clone());
        Ok(())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        let locked = self
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| StoreError::NotLocked(LockKey::Loan(loan.id).to_string()))?;
        *locked = loan.clone();
        Ok(())
    }

    async fn insert_loan_payment(&mut self, payment: &LoanPayment) -> Result<(), StoreError> {
        self.loan_payments.push(payment.clone());
        Ok(())
    }

    async fn loan_payments_total(&mut self, loan: LoanId) -> Result<Decimal, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .loan_payments
            .iter()
            .chain(self.loan_payments.iter())
            .filter(|payment| payment.loan_id == loan)
            .map(|payment| payment.amount)
            .sum())
    }

    async fn last_manual_payment_at(
        &mut self,
        loan: LoanId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .loan_payments
            .iter()
            .chain(self.loan_payments.iter())
            .filter(|payment| payment.loan_id == loan && payment.source == PaymentSource::Manual)
            .map(|payment| payment.created_at)
            .max())
    }

    async fn update_session(&mut self, session: &GameSession) -> Result<(), StoreError> {
        let locked = self
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StoreError::NotLocked(LockKey::Session(session.id).to_string()))?;
        *locked = session.clone();
        Ok(())
    }

    async fn count_plays_since(
        &mut self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let state = self.shared.state.read().await;
        let count = state
            .sessions
            .values()
            .map(|session| self.sessions.get(&session.id).unwrap_or(session))
            .filter(|session| session.tenant_id == tenant && session.user_id == user)
            .filter(|session| session.status.counts_as_play())
            .filter(|session| session.submitted_at.is_some_and(|at| at >= since))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn find_payroll_run(
        &mut self,
        tenant: TenantId,
        class_name: &str,
        kind: PayrollKind,
        period_start: NaiveDate,
    ) -> Result<Option<PayrollRun>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .payroll_runs
            .iter()
            .chain(self.payroll_runs.iter())
            .find(|run| {
                run.tenant_id == tenant
                    && run.class_name == class_name
                    && run.kind == kind
                    && run.period_start == period_start
            })
            .cloned())
    }

    async fn insert_payroll_run(&mut self, run: &PayrollRun) -> Result<(), StoreError> {
        let duplicate = self
            .find_payroll_run(run.tenant_id, &run.class_name, run.kind, run.period_start)
            .await?;
        if duplicate.is_some() {
            return Err(StoreError::Conflict(format!(
                "{} payroll for {} already recorded for {}",
                run.kind.as_str(),
                run.class_name,
                run.period_start
            )));
        }
        self.payroll_runs.push(run.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnit {
            shared,
            guards,
            accounts,
            treasuries,
            loans,
            sessions,
            new_loans,
            transactions,
            treasury_transactions,
            tax_transactions,
            loan_payments,
            payroll_runs,
            ..
        } = *self;

        {
            let mut state = shared.state.write().await;
            state.accounts.extend(accounts);
            state.treasuries.extend(treasuries);
            state.loans.extend(loans);
            state
                .loans
                .extend(new_loans.into_iter().map(|loan| (loan.id, loan)));
            state.sessions.extend(sessions);
            state.transactions.extend(transactions);
            state.treasury_transactions.extend(treasury_transactions);
            state.tax_transactions.extend(tax_transactions);
            state.loan_payments.extend(loan_payments);
            state.payroll_runs.extend(payroll_runs);
        }

        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn open_account(&self, tenant: TenantId, user: UserId) -> Result<Account, StoreError> {
        let mut state = self.shared.state.write().await;
        if let Some(existing) = state
            .accounts
            .values()
            .find(|account| account.tenant_id == tenant && account.user_id == user)
        {
            return Ok(existing.clone());
        }
        let account = Account::open(tenant, user, Utc::now());
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(
        &self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .accounts
            .get(&id)
            .filter(|account| account.tenant_id == tenant)
            .cloned())
    }

    async fn find_account_by_user(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.tenant_id == tenant && account.user_id == user)
            .cloned())
    }

    async fn list_transactions(
        &self,
        tenant: TenantId,
        account: AccountId,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, StoreError> {
        let state = self.shared.state.read().await;
        let matching: Vec<Transaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.tenant_id == tenant)
            .filter(|tx| tx.from_account == Some(account) || tx.to_account == Some(account))
            .cloned()
            .collect();
        Ok(paginate(&matching, page))
    }
}

#[async_trait]
impl TreasuryRepository for MemoryStore {
    async fn find_treasury(&self, key: &TreasuryKey) -> Result<Option<Treasury>, StoreError> {
        Ok(self.shared.state.read().await.treasuries.get(key).cloned())
    }

    async fn list_treasury_transactions(
        &self,
        key: &TreasuryKey,
        page: PageRequest,
    ) -> Result<PageResponse<TreasuryTransaction>, StoreError> {
        let state = self.shared.state.read().await;
        let matching: Vec<TreasuryTransaction> = state
            .treasury_transactions
            .iter()
            .rev()
            .filter(|tx| tx.tenant_id == key.tenant_id && tx.scope == key.scope)
            .cloned()
            .collect();
        Ok(paginate(&matching, page))
    }

    async fn list_tax_transactions(
        &self,
        tenant: TenantId,
        run: PayrollRunId,
    ) -> Result<Vec<TaxTransaction>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .tax_transactions
            .iter()
            .filter(|tx| tx.tenant_id == tenant && tx.payroll_run_id == run)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LoanRepository for MemoryStore {
    async fn find_loan(&self, tenant: TenantId, id: LoanId) -> Result<Option<Loan>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .loans
            .get(&id)
            .filter(|loan| loan.tenant_id == tenant)
            .cloned())
    }

    async fn list_loans(
        &self,
        tenant: TenantId,
        borrower: Option<AccountId>,
    ) -> Result<Vec<Loan>, StoreError> {
        let state = self.shared.state.read().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|loan| loan.tenant_id == tenant)
            .filter(|loan| borrower.is_none_or(|id| loan.borrower == id))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    async fn due_loans(
        &self,
        tenant: Option<TenantId>,
        today: NaiveDate,
    ) -> Result<Vec<Loan>, StoreError> {
        let state = self.shared.state.read().await;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|loan| tenant.is_none_or(|id| loan.tenant_id == id))
            .filter(|loan| loan.status == LoanStatus::Active)
            .filter(|loan| loan.next_payment_date.is_some_and(|date| date <= today))
            .cloned()
            .collect();
        loans.sort_by_key(|loan| (loan.next_payment_date, loan.id));
        Ok(loans)
    }

    async fn loan_payments(
        &self,
        tenant: TenantId,
        loan: LoanId,
    ) -> Result<Vec<LoanPayment>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .loan_payments
            .iter()
            .filter(|payment| payment.tenant_id == tenant && payment.loan_id == loan)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GameSessionRepository for MemoryStore {
    async fn create_session(&self, session: &GameSession) -> Result<(), StoreError> {
        let mut state = self.shared.state.write().await;
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .sessions
            .get(&id)
            .filter(|session| session.tenant_id == tenant)
            .cloned())
    }
}

#[async_trait]
impl RosterRepository for MemoryStore {
    async fn class_roster(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<Vec<RosterMember>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .roster
            .iter()
            .filter(|(t, class, _)| *t == tenant && class == class_name)
            .map(|(_, _, member)| member.clone())
            .collect())
    }

    async fn employment_for(
        &self,
        tenant: TenantId,
        account: AccountId,
    ) -> Result<Option<Employment>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .roster
            .iter()
            .find(|(t, _, member)| *t == tenant && member.account_id == account)
            .and_then(|(_, _, member)| member.employment.clone()))
    }

    async fn enroll(
        &self,
        tenant: TenantId,
        class_name: &str,
        member: &RosterMember,
    ) -> Result<(), StoreError> {
        let mut state = self.shared.state.write().await;
        state
            .roster
            .retain(|(t, _, existing)| !(*t == tenant && existing.account_id == member.account_id));
        state
            .roster
            .push((tenant, class_name.to_string(), member.clone()));
        Ok(())
    }
}

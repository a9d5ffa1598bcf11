//! Postgres unit of work.
//!
//! A unit wraps one database transaction. Row locks are `SELECT ... FOR UPDATE`
//! taken in the order the core enforces; waits are bounded by the
//! `lock_timeout` set when the transaction starts.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use classbank_core::earnings::types::GameSession;
use classbank_core::ledger::types::{
    Account, Transaction, Treasury, TreasuryKey, TreasuryTransaction,
};
use classbank_core::loan::types::{Loan, LoanPayment};
use classbank_core::payroll::types::{PayrollKind, PayrollRun, TaxTransaction};
use classbank_core::store::{HeldLocks, LedgerUnit, LockKey, StoreError};
use classbank_shared::types::{AccountId, GameSessionId, LoanId, TenantId, UserId};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::convert::{
    loan_payment_row, loan_row, offset, payroll_run_row, session_row, store_err,
    tax_transaction_row, transaction_row, treasury_transaction_row,
};
use crate::entities::sea_orm_active_enums as db_enums;
use crate::entities::{
    accounts, game_sessions, loan_payments, loans, payroll_runs, tax_transactions, transactions,
    treasuries, treasury_transactions,
};

const OPEN_LOAN_STATUSES: [db_enums::LoanStatus; 3] = [
    db_enums::LoanStatus::Pending,
    db_enums::LoanStatus::Approved,
    db_enums::LoanStatus::Active,
];

const PLAY_STATUSES: [db_enums::SessionStatus; 2] = [
    db_enums::SessionStatus::Credited,
    db_enums::SessionStatus::Completed,
];

/// Unit of work over one Postgres transaction.
pub struct PgUnit {
    txn: DatabaseTransaction,
    held: HeldLocks,
}

impl std::fmt::Debug for PgUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUnit")
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl PgUnit {
    /// Starts a transaction whose lock waits give up after `lock_timeout_ms`.
    pub(crate) async fn begin(
        db: &impl TransactionTrait,
        lock_timeout_ms: u64,
    ) -> Result<Self, StoreError> {
        use sea_orm::ConnectionTrait;

        let txn = db.begin().await.map_err(store_err)?;
        txn.execute_unprepared(&format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"))
            .await
            .map_err(store_err)?;
        Ok(Self {
            txn,
            held: HeldLocks::default(),
        })
    }

    fn acquire(&mut self, key: LockKey) -> Result<(), StoreError> {
        if self.held.admit(&key)? {
            self.held.record(key);
        }
        Ok(())
    }

    fn require(&self, key: LockKey) -> Result<(), StoreError> {
        if self.held.holds(&key) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(key.to_string()))
        }
    }

    async fn select_treasury(
        &self,
        key: &TreasuryKey,
    ) -> Result<Option<treasuries::Model>, StoreError> {
        treasuries::Entity::find()
            .filter(treasuries::Column::TenantId.eq(key.tenant_id.into_inner()))
            .filter(treasuries::Column::Scope.eq(key.scope.to_string()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl LedgerUnit for PgUnit {
    async fn lock_account(
        &mut self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.acquire(LockKey::Account(id))?;
        let row = accounts::Entity::find_by_id(id.into_inner())
            .filter(accounts::Column::TenantId.eq(tenant.into_inner()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(row.map(Account::from))
    }

    async fn lock_treasury(&mut self, key: &TreasuryKey) -> Result<Treasury, StoreError> {
        self.acquire(LockKey::Treasury(key.clone()))?;
        if let Some(row) = self.select_treasury(key).await? {
            return Treasury::try_from(row);
        }

        let empty = Treasury::empty(key, Utc::now());
        let row = treasuries::ActiveModel {
            id: Set(empty.id.into_inner()),
            tenant_id: Set(empty.tenant_id.into_inner()),
            scope: Set(empty.scope.to_string()),
            balance: Set(empty.balance),
            created_at: Set(offset(empty.created_at)),
            updated_at: Set(offset(empty.updated_at)),
        };
        let inserted = treasuries::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([treasuries::Column::TenantId, treasuries::Column::Scope])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await;
        match inserted {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(store_err(e)),
        }

        let row = self
            .select_treasury(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("treasury {}", key.scope)))?;
        Treasury::try_from(row)
    }

    async fn lock_loan(
        &mut self,
        tenant: TenantId,
        id: LoanId,
    ) -> Result<Option<Loan>, StoreError> {
        self.acquire(LockKey::Loan(id))?;
        loans::Entity::find_by_id(id.into_inner())
            .filter(loans::Column::TenantId.eq(tenant.into_inner()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_err)?
            .map(Loan::try_from)
            .transpose()
    }

    async fn lock_session(
        &mut self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError> {
        self.acquire(LockKey::Session(id))?;
        game_sessions::Entity::find_by_id(id.into_inner())
            .filter(game_sessions::Column::TenantId.eq(tenant.into_inner()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(store_err)?
            .map(GameSession::try_from)
            .transpose()
    }

    async fn set_account_balance(
        &mut self,
        id: AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.require(LockKey::Account(id))?;
        accounts::Entity::update_many()
            .col_expr(accounts::Column::Balance, Expr::value(balance))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(offset(at)))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn set_treasury_balance(
        &mut self,
        key: &TreasuryKey,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.require(LockKey::Treasury(key.clone()))?;
        treasuries::Entity::update_many()
            .col_expr(treasuries::Column::Balance, Expr::value(balance))
            .col_expr(treasuries::Column::UpdatedAt, Expr::value(offset(at)))
            .filter(treasuries::Column::TenantId.eq(key.tenant_id.into_inner()))
            .filter(treasuries::Column::Scope.eq(key.scope.to_string()))
            .exec(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        transactions::Entity::insert(transaction_row(tx))
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn insert_treasury_transaction(
        &mut self,
        tx: &TreasuryTransaction,
    ) -> Result<(), StoreError> {
        treasury_transactions::Entity::insert(treasury_transaction_row(tx))
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn insert_tax_transaction(&mut self, tx: &TaxTransaction) -> Result<(), StoreError> {
        tax_transactions::Entity::insert(tax_transaction_row(tx))
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn open_loans_for(
        &mut self,
        tenant: TenantId,
        borrower: AccountId,
    ) -> Result<Vec<Loan>, StoreError> {
        loans::Entity::find()
            .filter(loans::Column::TenantId.eq(tenant.into_inner()))
            .filter(loans::Column::Borrower.eq(borrower.into_inner()))
            .filter(loans::Column::Status.is_in(OPEN_LOAN_STATUSES))
            .order_by_asc(loans::Column::CreatedAt)
            .all(&self.txn)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        loans::Entity::insert(loan_row(loan)?)
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        self.require(LockKey::Loan(loan.id))?;
        loan_row(loan)?.update(&self.txn).await.map_err(store_err)?;
        Ok(())
    }

    async fn insert_loan_payment(&mut self, payment: &LoanPayment) -> Result<(), StoreError> {
        loan_payments::Entity::insert(loan_payment_row(payment))
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn loan_payments_total(&mut self, loan: LoanId) -> Result<Decimal, StoreError> {
        let total: Option<Option<Decimal>> = loan_payments::Entity::find()
            .select_only()
            .column_as(loan_payments::Column::Amount.sum(), "total")
            .filter(loan_payments::Column::LoanId.eq(loan.into_inner()))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(total.flatten().unwrap_or(Decimal::ZERO))
    }

    async fn last_manual_payment_at(
        &mut self,
        loan: LoanId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest: Option<Option<DateTime<FixedOffset>>> = loan_payments::Entity::find()
            .select_only()
            .column_as(loan_payments::Column::CreatedAt.max(), "latest")
            .filter(loan_payments::Column::LoanId.eq(loan.into_inner()))
            .filter(loan_payments::Column::Source.eq(db_enums::PaymentSource::Manual))
            .into_tuple()
            .one(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(latest.flatten().map(|at| at.with_timezone(&Utc)))
    }

    async fn update_session(&mut self, session: &GameSession) -> Result<(), StoreError> {
        self.require(LockKey::Session(session.id))?;
        session_row(session)?
            .update(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn count_plays_since(
        &mut self,
        tenant: TenantId,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let count = game_sessions::Entity::find()
            .filter(game_sessions::Column::TenantId.eq(tenant.into_inner()))
            .filter(game_sessions::Column::UserId.eq(user.into_inner()))
            .filter(game_sessions::Column::Status.is_in(PLAY_STATUSES))
            .filter(game_sessions::Column::SubmittedAt.gte(offset(since)))
            .count(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn find_payroll_run(
        &mut self,
        tenant: TenantId,
        class_name: &str,
        kind: PayrollKind,
        period_start: NaiveDate,
    ) -> Result<Option<PayrollRun>, StoreError> {
        payroll_runs::Entity::find()
            .filter(payroll_runs::Column::TenantId.eq(tenant.into_inner()))
            .filter(payroll_runs::Column::ClassName.eq(class_name))
            .filter(payroll_runs::Column::Kind.eq(db_enums::PayrollKind::from(kind)))
            .filter(payroll_runs::Column::PeriodStart.eq(period_start))
            .one(&self.txn)
            .await
            .map_err(store_err)?
            .map(PayrollRun::try_from)
            .transpose()
    }

    async fn insert_payroll_run(&mut self, run: &PayrollRun) -> Result<(), StoreError> {
        payroll_runs::Entity::insert(payroll_run_row(run)?)
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await.map_err(store_err)
    }
}


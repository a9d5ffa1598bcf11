//! Postgres implementation of the store traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use classbank_core::earnings::types::GameSession;
use classbank_core::ledger::types::{Account, Transaction, Treasury, TreasuryKey, TreasuryTransaction};
use classbank_core::loan::types::{Loan, LoanPayment};
use classbank_core::payroll::types::{Employment, RosterMember, TaxTransaction};
use classbank_core::store::{
    AccountRepository, GameSessionRepository, LedgerStore, LedgerUnit, LoanRepository,
    RosterRepository, StoreError, TreasuryRepository,
};
use classbank_shared::types::{
    AccountId, GameSessionId, LoanId, PageRequest, PageResponse, PayrollRunId, TenantId, UserId,
};
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use super::convert::{int, offset, session_row, store_err};
use super::unit::PgUnit;
use crate::entities::sea_orm_active_enums::LoanStatus;
use crate::entities::{
    accounts, class_members, game_sessions, loan_payments, loans, tax_transactions, transactions,
    treasuries, treasury_transactions,
};

/// Lock wait bound used when none is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgStore {
    /// Creates a store with the default lock timeout.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self::with_lock_timeout(db, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose lock waits give up after `lock_timeout`.
    #[must_use]
    pub const fn with_lock_timeout(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn lock_timeout_ms(&self) -> u64 {
        u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

async fn fetch_page<E>(
    db: &DatabaseConnection,
    query: sea_orm::Select<E>,
    page: PageRequest,
) -> Result<(Vec<E::Model>, u64, PageRequest), StoreError>
where
    E: EntityTrait,
    E::Model: Sync + 'static,
{
    let page = page.clamped();
    let total = query.clone().count(db).await.map_err(store_err)?;
    let rows = query
        .offset(page.offset())
        .limit(page.limit())
        .all(db)
        .await
        .map_err(store_err)?;
    Ok((rows, total, page))
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        Ok(Box::new(PgUnit::begin(&self.db, self.lock_timeout_ms()).await?))
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn open_account(&self, tenant: TenantId, user: UserId) -> Result<Account, StoreError> {
        let account = Account::open(tenant, user, Utc::now());
        let row = accounts::ActiveModel {
            id: Set(account.id.into_inner()),
            tenant_id: Set(tenant.into_inner()),
            user_id: Set(user.into_inner()),
            balance: Set(Decimal::ZERO),
            created_at: Set(offset(account.created_at)),
            updated_at: Set(offset(account.updated_at)),
        };
        accounts::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([accounts::Column::TenantId, accounts::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(store_err)?;

        self.find_account_by_user(tenant, user)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account of user {user}")))
    }

    async fn find_account(
        &self,
        tenant: TenantId,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        let row = accounts::Entity::find_by_id(id.into_inner())
            .filter(accounts::Column::TenantId.eq(tenant.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_err)?;
        Ok(row.map(Account::from))
    }

    async fn find_account_by_user(
        &self,
        tenant: TenantId,
        user: UserId,
    ) -> Result<Option<Account>, StoreError> {
        let row = accounts::Entity::find()
            .filter(accounts::Column::TenantId.eq(tenant.into_inner()))
            .filter(accounts::Column::UserId.eq(user.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_err)?;
        Ok(row.map(Account::from))
    }

    async fn list_transactions(
        &self,
        tenant: TenantId,
        account: AccountId,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, StoreError> {
        let query = transactions::Entity::find()
            .filter(transactions::Column::TenantId.eq(tenant.into_inner()))
            .filter(
                Condition::any()
                    .add(transactions::Column::FromAccount.eq(account.into_inner()))
                    .add(transactions::Column::ToAccount.eq(account.into_inner())),
            )
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id);
        let (rows, total, page) = fetch_page(&self.db, query, page).await?;
        let data = rows.into_iter().map(Transaction::from).collect();
        Ok(PageResponse::new(data, page, total))
    }
}

#[async_trait]
impl TreasuryRepository for PgStore {
    async fn find_treasury(&self, key: &TreasuryKey) -> Result<Option<Treasury>, StoreError> {
        treasuries::Entity::find()
            .filter(treasuries::Column::TenantId.eq(key.tenant_id.into_inner()))
            .filter(treasuries::Column::Scope.eq(key.scope.to_string()))
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(Treasury::try_from)
            .transpose()
    }

    async fn list_treasury_transactions(
        &self,
        key: &TreasuryKey,
        page: PageRequest,
    ) -> Result<PageResponse<TreasuryTransaction>, StoreError> {
        let query = treasury_transactions::Entity::find()
            .filter(treasury_transactions::Column::TenantId.eq(key.tenant_id.into_inner()))
            .filter(treasury_transactions::Column::Scope.eq(key.scope.to_string()))
            .order_by_desc(treasury_transactions::Column::CreatedAt)
            .order_by_desc(treasury_transactions::Column::Id);
        let (rows, total, page) = fetch_page(&self.db, query, page).await?;
        let data = rows
            .into_iter()
            .map(TreasuryTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageResponse::new(data, page, total))
    }

    async fn list_tax_transactions(
        &self,
        tenant: TenantId,
        run: PayrollRunId,
    ) -> Result<Vec<TaxTransaction>, StoreError> {
        let rows = tax_transactions::Entity::find()
            .filter(tax_transactions::Column::TenantId.eq(tenant.into_inner()))
            .filter(tax_transactions::Column::PayrollRunId.eq(run.into_inner()))
            .order_by_asc(tax_transactions::Column::CreatedAt)
            .order_by_asc(tax_transactions::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(TaxTransaction::from).collect())
    }
}

#[async_trait]
impl LoanRepository for PgStore {
    async fn find_loan(&self, tenant: TenantId, id: LoanId) -> Result<Option<Loan>, StoreError> {
        loans::Entity::find_by_id(id.into_inner())
            .filter(loans::Column::TenantId.eq(tenant.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(Loan::try_from)
            .transpose()
    }

    async fn list_loans(
        &self,
        tenant: TenantId,
        borrower: Option<AccountId>,
    ) -> Result<Vec<Loan>, StoreError> {
        let mut query = loans::Entity::find().filter(loans::Column::TenantId.eq(tenant.into_inner()));
        if let Some(borrower) = borrower {
            query = query.filter(loans::Column::Borrower.eq(borrower.into_inner()));
        }
        query
            .order_by_desc(loans::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    async fn due_loans(
        &self,
        tenant: Option<TenantId>,
        today: NaiveDate,
    ) -> Result<Vec<Loan>, StoreError> {
        let mut query = loans::Entity::find()
            .filter(loans::Column::Status.eq(LoanStatus::Active))
            .filter(loans::Column::NextPaymentDate.lte(today));
        if let Some(tenant) = tenant {
            query = query.filter(loans::Column::TenantId.eq(tenant.into_inner()));
        }
        query
            .order_by_asc(loans::Column::NextPaymentDate)
            .order_by_asc(loans::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    async fn loan_payments(
        &self,
        tenant: TenantId,
        loan: LoanId,
    ) -> Result<Vec<LoanPayment>, StoreError> {
        let rows = loan_payments::Entity::find()
            .filter(loan_payments::Column::TenantId.eq(tenant.into_inner()))
            .filter(loan_payments::Column::LoanId.eq(loan.into_inner()))
            .order_by_asc(loan_payments::Column::CreatedAt)
            .order_by_asc(loan_payments::Column::Id)
            .all(&self.db)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(LoanPayment::from).collect())
    }
}

#[async_trait]
impl GameSessionRepository for PgStore {
    async fn create_session(&self, session: &GameSession) -> Result<(), StoreError> {
        game_sessions::Entity::insert(session_row(session)?)
            .exec_without_returning(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn find_session(
        &self,
        tenant: TenantId,
        id: GameSessionId,
    ) -> Result<Option<GameSession>, StoreError> {
        game_sessions::Entity::find_by_id(id.into_inner())
            .filter(game_sessions::Column::TenantId.eq(tenant.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(GameSession::try_from)
            .transpose()
    }
}

#[async_trait]
impl RosterRepository for PgStore {
    async fn class_roster(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<Vec<RosterMember>, StoreError> {
        class_members::Entity::find()
            .filter(class_members::Column::TenantId.eq(tenant.into_inner()))
            .filter(class_members::Column::ClassName.eq(class_name))
            .order_by_asc(class_members::Column::UserId)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(RosterMember::try_from)
            .collect()
    }

    async fn employment_for(
        &self,
        tenant: TenantId,
        account: AccountId,
    ) -> Result<Option<Employment>, StoreError> {
        let row = class_members::Entity::find_by_id((tenant.into_inner(), account.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => Ok(RosterMember::try_from(row)?.employment),
            None => Ok(None),
        }
    }

    async fn enroll(
        &self,
        tenant: TenantId,
        class_name: &str,
        member: &RosterMember,
    ) -> Result<(), StoreError> {
        let job = member.employment.as_ref();
        let level = job.map(|job| int(job.level, "level")).transpose()?;
        let row = class_members::ActiveModel {
            tenant_id: Set(tenant.into_inner()),
            account_id: Set(member.account_id.into_inner()),
            class_name: Set(class_name.to_string()),
            user_id: Set(member.user_id.into_inner()),
            job_title: Set(job.map(|job| job.job_title.clone())),
            base_pay: Set(job.map(|job| job.base_pay)),
            level: Set(level),
            contractual: Set(job.is_some_and(|job| job.contractual)),
        };
        class_members::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    class_members::Column::TenantId,
                    class_members::Column::AccountId,
                ])
                .update_columns([
                    class_members::Column::ClassName,
                    class_members::Column::UserId,
                    class_members::Column::JobTitle,
                    class_members::Column::BasePay,
                    class_members::Column::Level,
                    class_members::Column::Contractual,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

//! Account-level operations built on the ledger engine.

use std::sync::Arc;

use classbank_shared::types::{AccountId, PageRequest, PageResponse, TenantId, UserId};
use rust_decimal::Decimal;
use tracing::info;

use super::engine::LedgerEngine;
use super::error::LedgerError;
use super::types::{
    Account, DebitPolicy, Movement, MovementReceipt, MovementRequest, Party, Transaction,
    TransactionKind, Treasury, TreasuryKey, TreasuryScope, TreasuryTransaction,
};
use crate::actor::Actor;
use crate::clock::Clock;
use crate::store::EconomyStore;

/// Balances, history, and the everyday movements students and teachers make.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn EconomyStore>,
    engine: LedgerEngine,
}

impl AccountService {
    /// Creates the service.
    pub fn new(store: Arc<dyn EconomyStore>, clock: Arc<dyn Clock>) -> Self {
        let engine = LedgerEngine::new(Arc::clone(&store), clock);
        Self { store, engine }
    }

    /// The engine used by this service.
    pub fn engine(&self) -> &LedgerEngine {
        &self.engine
    }

    /// Opens the account of a newly registered user. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Store` on storage failure.
    pub async fn open_account(&self, tenant: TenantId, user: UserId) -> Result<Account, LedgerError> {
        let account = self.store.open_account(tenant, user).await?;
        info!(tenant_id = %tenant, user_id = %user, account_id = %account.id, "Account opened");
        Ok(account)
    }

    /// The caller's own account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoAccount` if none was opened.
    pub async fn my_account(&self, actor: &Actor) -> Result<Account, LedgerError> {
        self.store
            .find_account_by_user(actor.tenant_id, actor.user_id)
            .await?
            .ok_or(LedgerError::NoAccount)
    }

    /// Transactions of an account. Students may only read their own.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Forbidden` or `LedgerError::AccountNotFound`.
    pub async fn history(
        &self,
        actor: &Actor,
        account_id: AccountId,
        page: PageRequest,
    ) -> Result<PageResponse<Transaction>, LedgerError> {
        let account = self
            .store
            .find_account(actor.tenant_id, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if !actor.is_staff() && account.user_id != actor.user_id {
            return Err(LedgerError::Forbidden(
                "students may only read their own history".to_string(),
            ));
        }
        Ok(self
            .store
            .list_transactions(actor.tenant_id, account.id, page)
            .await?)
    }

    /// Sends money from the caller's account to another student.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the caller cannot cover the amount.
    pub async fn transfer(
        &self,
        actor: &Actor,
        to: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<MovementReceipt, LedgerError> {
        let from = self.my_account(actor).await?;
        self.engine
            .apply(&MovementRequest {
                tenant_id: actor.tenant_id,
                movement: Movement::Transfer {
                    from: Party::Account(from.id),
                    to: Party::Account(to),
                    policy: DebitPolicy::Ordinary,
                },
                amount,
                kind: TransactionKind::Transfer,
                description: description.to_string(),
            })
            .await
    }

    /// Pays the shop from the caller's account.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the account is frozen or short.
    pub async fn purchase(
        &self,
        actor: &Actor,
        amount: Decimal,
        item: &str,
    ) -> Result<MovementReceipt, LedgerError> {
        let account = self.my_account(actor).await?;
        self.engine
            .apply(&MovementRequest {
                tenant_id: actor.tenant_id,
                movement: Movement::Transfer {
                    from: Party::Account(account.id),
                    to: Party::Treasury(TreasuryScope::Shop),
                    policy: DebitPolicy::Ordinary,
                },
                amount,
                kind: TransactionKind::Purchase,
                description: format!("Purchase: {item}"),
            })
            .await
    }

    /// Current state of a class treasury; `None` before its first movement.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Forbidden` for students.
    pub async fn treasury(
        &self,
        actor: &Actor,
        class_name: &str,
    ) -> Result<Option<Treasury>, LedgerError> {
        require_staff(actor)?;
        Ok(self
            .store
            .find_treasury(&TreasuryKey::class(actor.tenant_id, class_name))
            .await?)
    }

    /// Treasury transactions of a class treasury.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Forbidden` for students.
    pub async fn treasury_history(
        &self,
        actor: &Actor,
        class_name: &str,
        page: PageRequest,
    ) -> Result<PageResponse<TreasuryTransaction>, LedgerError> {
        require_staff(actor)?;
        Ok(self
            .store
            .list_treasury_transactions(&TreasuryKey::class(actor.tenant_id, class_name), page)
            .await?)
    }

    /// Tops up a class treasury.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Forbidden` for students.
    pub async fn deposit(
        &self,
        actor: &Actor,
        class_name: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<MovementReceipt, LedgerError> {
        require_staff(actor)?;
        self.engine
            .apply(&MovementRequest {
                tenant_id: actor.tenant_id,
                movement: Movement::Credit {
                    to: Party::Treasury(TreasuryScope::class(class_name)),
                },
                amount,
                kind: TransactionKind::Deposit,
                description: description.to_string(),
            })
            .await
    }

    /// Fines a student into the class treasury.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Forbidden` for students, or an insufficiency
    /// error if the student cannot pay.
    pub async fn fine(
        &self,
        actor: &Actor,
        class_name: &str,
        account_id: AccountId,
        amount: Decimal,
        reason: &str,
    ) -> Result<MovementReceipt, LedgerError> {
        require_staff(actor)?;
        self.engine
            .apply(&MovementRequest {
                tenant_id: actor.tenant_id,
                movement: Movement::Transfer {
                    from: Party::Account(account_id),
                    to: Party::Treasury(TreasuryScope::class(class_name)),
                    policy: DebitPolicy::Ordinary,
                },
                amount,
                kind: TransactionKind::Fine,
                description: format!("Fine: {reason}"),
            })
            .await
    }
}

fn require_staff(actor: &Actor) -> Result<(), LedgerError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(LedgerError::Forbidden("teacher role required".to_string()))
    }
}

//! Ledger engine: validated, atomic money movements.
//!
//! A movement locks its rows in the global lock order, re-reads balances,
//! validates against the locked rows, writes the new balances and the log rows,
//! and commits. Any failure after the first lock rolls the whole unit back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use classbank_shared::types::{
    TransactionId, TreasuryId, TreasuryTransactionId, is_whole_cents, within_money_range,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::error::LedgerError;
use super::types::{
    Account, DebitPolicy, DisburseReceipt, DisburseRequest, Disbursement, MovementReceipt,
    MovementRequest, Party, Transaction, Treasury, TreasuryFlow, TreasuryKey, TreasuryScope,
    TreasuryTransaction,
};
use crate::clock::Clock;
use crate::store::{EconomyStore, LedgerUnit, LockKey, abandon};

/// A row locked on behalf of a party.
enum Locked {
    Account(Account),
    Treasury(Treasury),
}

/// Result of one leg.
struct Leg {
    balance: Decimal,
    treasury: Option<(TreasuryId, TreasuryScope)>,
}

/// Applies movements against a store.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    /// Creates an engine.
    pub fn new(store: Arc<dyn EconomyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Applies one movement in its own unit.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` and leaves every balance untouched if the
    /// movement is invalid or cannot be covered.
    pub async fn apply(&self, request: &MovementRequest) -> Result<MovementReceipt, LedgerError> {
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        match Self::apply_in(unit.as_mut(), request, now).await {
            Ok(receipt) => {
                unit.commit().await?;
                info!(
                    tenant_id = %request.tenant_id,
                    kind = request.kind.as_str(),
                    amount = %request.amount,
                    "Movement committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                abandon(unit).await;
                Err(e)
            }
        }
    }

    /// Applies one disbursement batch in its own unit.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` and leaves every balance untouched on failure.
    pub async fn disburse(&self, request: &DisburseRequest) -> Result<DisburseReceipt, LedgerError> {
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        match Self::disburse_in(unit.as_mut(), request, now).await {
            Ok(receipt) => {
                unit.commit().await?;
                info!(
                    tenant_id = %request.tenant_id,
                    scope = %request.scope,
                    recipients = receipt.transactions.len(),
                    total = %receipt.treasury_transaction.amount,
                    "Disbursement committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                abandon(unit).await;
                Err(e)
            }
        }
    }

    /// Applies one movement inside a unit owned by the caller.
    ///
    /// Rows already locked by the unit are reused, so callers may lock rows
    /// that sort before the movement's parties first.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError`; the caller must roll the unit back.
    pub async fn apply_in(
        unit: &mut dyn LedgerUnit,
        request: &MovementRequest,
        now: DateTime<Utc>,
    ) -> Result<MovementReceipt, LedgerError> {
        validate_amount(request.amount)?;
        let tenant = request.tenant_id;
        let source = request.movement.source();
        let destination = request.movement.destination();
        if let (Some(from), Some(to)) = (source, destination)
            && from == to
        {
            return Err(LedgerError::SameParty);
        }

        let mut parties: Vec<&Party> = source.into_iter().chain(destination).collect();
        parties.sort_by_key(|party| lock_key(request, party));
        for party in parties {
            lock_party(unit, request, party).await?;
        }

        let debit = match source {
            Some(party) => Some(debit_leg(unit, request, party, now).await?),
            None => None,
        };
        let credit = match destination {
            Some(party) => Some(credit_leg(unit, request, party, now).await?),
            None => None,
        };

        let from_account = source.and_then(Party::account_id);
        let to_account = destination.and_then(Party::account_id);

        let transaction = if from_account.is_some() || to_account.is_some() {
            let tx = Transaction {
                id: TransactionId::new(),
                tenant_id: tenant,
                from_account,
                to_account,
                amount: request.amount,
                kind: request.kind,
                description: request.description.clone(),
                created_at: now,
            };
            unit.insert_transaction(&tx).await?;
            Some(tx)
        } else {
            None
        };

        let mut treasury_transactions = Vec::new();
        let treasury_legs = [
            (debit.as_ref(), TreasuryFlow::Outflow, to_account),
            (credit.as_ref(), TreasuryFlow::Inflow, from_account),
        ];
        for (leg, flow, counterparty) in treasury_legs {
            if let Some((treasury_id, scope)) = leg.and_then(|leg| leg.treasury.clone()) {
                let tx = TreasuryTransaction {
                    id: TreasuryTransactionId::new(),
                    tenant_id: tenant,
                    treasury_id,
                    scope,
                    flow,
                    amount: request.amount,
                    kind: request.kind,
                    description: request.description.clone(),
                    counterparty_account: counterparty,
                    payroll_run_id: None,
                    created_at: now,
                };
                unit.insert_treasury_transaction(&tx).await?;
                treasury_transactions.push(tx);
            }
        }

        debug!(
            tenant_id = %tenant,
            kind = request.kind.as_str(),
            amount = %request.amount,
            "Movement applied"
        );

        Ok(MovementReceipt {
            transaction,
            treasury_transactions,
            source_balance: debit.map(|leg| leg.balance),
            destination_balance: credit.map(|leg| leg.balance),
        })
    }

    /// Debits one treasury once by the batch total and credits every account,
    /// inside a unit owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError`; the caller must roll the unit back.
    pub async fn disburse_in(
        unit: &mut dyn LedgerUnit,
        request: &DisburseRequest,
        now: DateTime<Utc>,
    ) -> Result<DisburseReceipt, LedgerError> {
        if request.credits.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        let mut credits: Vec<&Disbursement> = request.credits.iter().collect();
        credits.sort_by_key(|credit| credit.account_id);
        for credit in &credits {
            validate_amount(credit.amount)?;
        }
        if let Some(pair) = credits
            .windows(2)
            .find(|pair| pair[0].account_id == pair[1].account_id)
        {
            return Err(LedgerError::DuplicateRecipient(pair[0].account_id));
        }
        let total = credits
            .iter()
            .try_fold(Decimal::ZERO, |total, credit| credited(total, credit.amount))?;

        let key = TreasuryKey::new(request.tenant_id, request.scope.clone());
        let treasury = unit.lock_treasury(&key).await?;
        if treasury.balance < total {
            return Err(LedgerError::TreasuryInsufficientFunds {
                scope: request.scope.clone(),
                available: treasury.balance,
                requested: total,
            });
        }
        let treasury_balance = treasury.balance - total;
        unit.set_treasury_balance(&key, treasury_balance, now).await?;

        let mut transactions = Vec::with_capacity(credits.len());
        for credit in credits {
            let account = unit
                .lock_account(request.tenant_id, credit.account_id)
                .await?
                .ok_or(LedgerError::AccountNotFound(credit.account_id))?;
            let balance = credited(account.balance, credit.amount)?;
            unit.set_account_balance(account.id, balance, now).await?;

            let tx = Transaction {
                id: TransactionId::new(),
                tenant_id: request.tenant_id,
                from_account: None,
                to_account: Some(account.id),
                amount: credit.amount,
                kind: request.kind,
                description: credit.description.clone(),
                created_at: now,
            };
            unit.insert_transaction(&tx).await?;
            transactions.push(tx);
        }

        let treasury_transaction = TreasuryTransaction {
            id: TreasuryTransactionId::new(),
            tenant_id: request.tenant_id,
            treasury_id: treasury.id,
            scope: request.scope.clone(),
            flow: TreasuryFlow::Outflow,
            amount: total,
            kind: request.kind,
            description: request.description.clone(),
            counterparty_account: None,
            payroll_run_id: request.payroll_run_id,
            created_at: now,
        };
        unit.insert_treasury_transaction(&treasury_transaction)
            .await?;

        Ok(DisburseReceipt {
            transactions,
            treasury_transaction,
            treasury_balance,
        })
    }
}

/// Rejects non-positive amounts, sub-cent precision, and amounts past the
/// stored money range.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount`.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO || !is_whole_cents(amount) || !within_money_range(amount) {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// `balance + amount`, kept inside the stored money range.
fn credited(balance: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    balance
        .checked_add(amount)
        .filter(|total| within_money_range(*total))
        .ok_or(LedgerError::BalanceLimitExceeded { balance, amount })
}

fn lock_key(request: &MovementRequest, party: &Party) -> LockKey {
    match party {
        Party::Account(id) => LockKey::Account(*id),
        Party::Treasury(scope) => {
            LockKey::Treasury(TreasuryKey::new(request.tenant_id, scope.clone()))
        }
    }
}

async fn lock_party(
    unit: &mut dyn LedgerUnit,
    request: &MovementRequest,
    party: &Party,
) -> Result<Locked, LedgerError> {
    match party {
        Party::Account(id) => unit
            .lock_account(request.tenant_id, *id)
            .await?
            .map(Locked::Account)
            .ok_or(LedgerError::AccountNotFound(*id)),
        Party::Treasury(scope) => {
            let key = TreasuryKey::new(request.tenant_id, scope.clone());
            Ok(Locked::Treasury(unit.lock_treasury(&key).await?))
        }
    }
}

async fn debit_leg(
    unit: &mut dyn LedgerUnit,
    request: &MovementRequest,
    party: &Party,
    now: DateTime<Utc>,
) -> Result<Leg, LedgerError> {
    let amount = request.amount;
    match lock_party(unit, request, party).await? {
        Locked::Account(account) => {
            if account.is_frozen() {
                return Err(LedgerError::AccountFrozenNegative(account.id));
            }
            if request.movement.policy() == DebitPolicy::Ordinary && account.balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    available: account.balance,
                    requested: amount,
                });
            }
            let balance = account.balance - amount;
            unit.set_account_balance(account.id, balance, now).await?;
            Ok(Leg {
                balance,
                treasury: None,
            })
        }
        Locked::Treasury(treasury) => {
            if treasury.balance < amount {
                return Err(LedgerError::TreasuryInsufficientFunds {
                    scope: treasury.scope,
                    available: treasury.balance,
                    requested: amount,
                });
            }
            let balance = treasury.balance - amount;
            unit.set_treasury_balance(&treasury.key(), balance, now)
                .await?;
            Ok(Leg {
                balance,
                treasury: Some((treasury.id, treasury.scope)),
            })
        }
    }
}

async fn credit_leg(
    unit: &mut dyn LedgerUnit,
    request: &MovementRequest,
    party: &Party,
    now: DateTime<Utc>,
) -> Result<Leg, LedgerError> {
    let amount = request.amount;
    match lock_party(unit, request, party).await? {
        Locked::Account(account) => {
            let balance = credited(account.balance, amount)?;
            unit.set_account_balance(account.id, balance, now).await?;
            Ok(Leg {
                balance,
                treasury: None,
            })
        }
        Locked::Treasury(treasury) => {
            let balance = credited(treasury.balance, amount)?;
            unit.set_treasury_balance(&treasury.key(), balance, now)
                .await?;
            Ok(Leg {
                balance,
                treasury: Some((treasury.id, treasury.scope)),
            })
        }
    }
}

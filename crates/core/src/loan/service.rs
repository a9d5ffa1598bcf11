//! Loan lifecycle: application, decision, weekly settlement, and repayment.
//!
//! Every state change runs in one unit that locks the loan before the
//! borrower's account, so a loan and its money always move together.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use classbank_shared::types::{
    AccountId, CENT, LoanId, LoanPaymentId, TenantId, TransactionId, is_settled,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::LoanError;
use super::schedule;
use super::types::{
    Loan, LoanPayment, LoanQuote, LoanStatus, PaymentSource, ReconciliationEntry, SettledLoan,
    SettlementFailure, SettlementReport,
};
use crate::actor::Actor;
use crate::clock::Clock;
use crate::ledger::{
    DebitPolicy, LedgerEngine, Movement, MovementReceipt, MovementRequest, Party,
    TransactionKind, validate_amount,
};
use crate::payroll::salary::gross_salary;
use crate::settings::{LoanPolicy, SettingsProvider};
use crate::store::{EconomyStore, LedgerUnit, StoreError, complete};

/// Loan operations.
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn EconomyStore>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl LoanService {
    /// Creates the service.
    pub fn new(
        store: Arc<dyn EconomyStore>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    /// Prices a loan without applying for it.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::InvalidAmount` or `LoanError::InvalidTerm`.
    pub async fn quote(
        &self,
        tenant: TenantId,
        amount: Decimal,
        term_weeks: u32,
    ) -> Result<LoanQuote, LoanError> {
        let policy = self.settings.loan_policy(tenant).await?;
        schedule::quote(amount, term_weeks, &policy)
    }

    /// Applies for a loan on the caller's account.
    ///
    /// # Errors
    ///
    /// Returns a `LoanError` if the borrower is not eligible.
    pub async fn apply(
        &self,
        actor: &Actor,
        amount: Decimal,
        term_weeks: u32,
    ) -> Result<Loan, LoanError> {
        let tenant = actor.tenant_id;
        let policy = self.settings.loan_policy(tenant).await?;
        let quote = schedule::quote(amount, term_weeks, &policy)?;
        let account = self.borrower_account(actor).await?;

        let employment = self
            .store
            .employment_for(tenant, account)
            .await?
            .ok_or(LoanError::NoEmployment)?;
        let weekly_gross = gross_salary(&employment);
        if weekly_gross <= Decimal::ZERO {
            return Err(LoanError::NoEmployment);
        }
        let limit = schedule::affordability_limit(weekly_gross, &policy);
        if quote.weekly_payment > limit {
            return Err(LoanError::Unaffordable {
                weekly_payment: quote.weekly_payment,
                limit,
            });
        }

        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = apply_in(unit.as_mut(), tenant, account, &quote, now).await;
        let loan = complete(unit, result).await?;

        info!(
            tenant_id = %tenant,
            loan_id = %loan.id,
            amount = %loan.amount,
            term_weeks = loan.term_weeks,
            "Loan applied"
        );
        Ok(loan)
    }

    /// Approves a pending loan and pays out the principal.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::Forbidden` for students or
    /// `LoanError::InvalidTransition` if the loan is not pending.
    pub async fn approve(&self, actor: &Actor, loan_id: LoanId) -> Result<Loan, LoanError> {
        require_staff(actor)?;
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = approve_in(unit.as_mut(), actor, loan_id, now).await;
        let loan = complete(unit, result).await?;

        info!(
            tenant_id = %actor.tenant_id,
            loan_id = %loan.id,
            next_payment_date = ?loan.next_payment_date,
            "Loan approved"
        );
        Ok(loan)
    }

    /// Denies a pending loan. No money moves.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::Forbidden` for students or
    /// `LoanError::InvalidTransition` if the loan is not pending.
    pub async fn deny(&self, actor: &Actor, loan_id: LoanId) -> Result<Loan, LoanError> {
        require_staff(actor)?;
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = deny_in(unit.as_mut(), actor, loan_id, now).await;
        let loan = complete(unit, result).await?;

        info!(tenant_id = %actor.tenant_id, loan_id = %loan.id, "Loan denied");
        Ok(loan)
    }

    /// Takes one installment from every active loan due today or earlier.
    ///
    /// Each loan settles in its own unit; a failure is recorded in the report
    /// and the batch moves on.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::Store` only if the due loans cannot be listed.
    pub async fn settle_due(&self, tenant: Option<TenantId>) -> Result<SettlementReport, LoanError> {
        let today = self.clock.today();
        let due = self.store.due_loans(tenant, today).await?;
        let mut report = SettlementReport::default();

        for loan in due {
            match self.settle_one(loan.tenant_id, loan.id, today).await {
                Ok(Some(settled)) => report.settled.push(settled),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        tenant_id = %loan.tenant_id,
                        loan_id = %loan.id,
                        error = %e,
                        "Scheduled repayment failed"
                    );
                    report.failures.push(SettlementFailure {
                        loan_id: loan.id,
                        tenant_id: loan.tenant_id,
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            settled = report.settled.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            %today,
            "Loan settlement finished"
        );
        Ok(report)
    }

    async fn settle_one(
        &self,
        tenant: TenantId,
        loan_id: LoanId,
        today: NaiveDate,
    ) -> Result<Option<SettledLoan>, LoanError> {
        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = settle_in(unit.as_mut(), tenant, loan_id, today, now).await;
        complete(unit, result).await
    }

    /// Pays part of the caller's loan from their account.
    ///
    /// The amount is clamped to the outstanding balance.
    ///
    /// # Errors
    ///
    /// Returns a `LoanError` if the caller is not the borrower, the loan is not
    /// active, the cool-down has not passed, or the account cannot cover it.
    pub async fn make_payment(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        amount: Decimal,
    ) -> Result<LoanPayment, LoanError> {
        validate_amount(amount).map_err(|_| LoanError::InvalidAmount(amount))?;
        self.manual_payment(actor, loan_id, Some(amount)).await
    }

    /// Pays the whole outstanding balance of the caller's loan.
    ///
    /// # Errors
    ///
    /// Same as [`LoanService::make_payment`].
    pub async fn pay_off(&self, actor: &Actor, loan_id: LoanId) -> Result<LoanPayment, LoanError> {
        self.manual_payment(actor, loan_id, None).await
    }

    async fn manual_payment(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        requested: Option<Decimal>,
    ) -> Result<LoanPayment, LoanError> {
        let policy = self.settings.loan_policy(actor.tenant_id).await?;
        let account = self.borrower_account(actor).await?;
        let now = self.clock.now();

        let mut unit = self.store.begin().await?;
        let result = manual_in(
            unit.as_mut(),
            actor.tenant_id,
            account,
            loan_id,
            requested,
            &policy,
            now,
        )
        .await;
        let payment = complete(unit, result).await?;

        info!(
            tenant_id = %actor.tenant_id,
            loan_id = %loan_id,
            amount = %payment.amount,
            outstanding = %payment.outstanding_after,
            "Manual loan payment"
        );
        Ok(payment)
    }

    /// Loans visible to the caller: their own, or the whole tenant for staff.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::NoAccount` for a student without an account.
    pub async fn list_loans(&self, actor: &Actor) -> Result<Vec<Loan>, LoanError> {
        let borrower = if actor.is_staff() {
            None
        } else {
            Some(self.borrower_account(actor).await?)
        };
        Ok(self.store.list_loans(actor.tenant_id, borrower).await?)
    }

    /// A single loan visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::LoanNotFound` or `LoanError::Forbidden`.
    pub async fn get_loan(&self, actor: &Actor, loan_id: LoanId) -> Result<Loan, LoanError> {
        let loan = self
            .store
            .find_loan(actor.tenant_id, loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound(loan_id))?;
        if !actor.is_staff() && loan.borrower != self.borrower_account(actor).await? {
            return Err(LoanError::Forbidden(
                "students may only read their own loans".to_string(),
            ));
        }
        Ok(loan)
    }

    /// Payment history of a loan visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::LoanNotFound` or `LoanError::Forbidden`.
    pub async fn payments(
        &self,
        actor: &Actor,
        loan_id: LoanId,
    ) -> Result<Vec<LoanPayment>, LoanError> {
        let loan = self.get_loan(actor, loan_id).await?;
        Ok(self.store.loan_payments(actor.tenant_id, loan.id).await?)
    }

    /// Compares every repaying or repaid loan's cached outstanding balance with
    /// the value derived from its payments. Read-only.
    ///
    /// # Errors
    ///
    /// Returns `LoanError::Forbidden` for students.
    pub async fn reconcile(&self, actor: &Actor) -> Result<Vec<ReconciliationEntry>, LoanError> {
        require_staff(actor)?;
        let loans = self.store.list_loans(actor.tenant_id, None).await?;
        let mut entries = Vec::new();

        for loan in loans
            .into_iter()
            .filter(|loan| matches!(loan.status, LoanStatus::Active | LoanStatus::PaidOff))
        {
            let paid: Decimal = self
                .store
                .loan_payments(actor.tenant_id, loan.id)
                .await?
                .iter()
                .map(|payment| payment.amount)
                .sum();
            let derived = loan.total_repayable - paid;
            let consistent = (loan.outstanding_balance - derived).abs() <= CENT;
            if !consistent {
                warn!(
                    loan_id = %loan.id,
                    cached = %loan.outstanding_balance,
                    %derived,
                    "Loan balance drift"
                );
            }
            entries.push(ReconciliationEntry {
                loan_id: loan.id,
                status: loan.status,
                cached_outstanding: loan.outstanding_balance,
                derived_outstanding: derived,
                consistent,
            });
        }
        Ok(entries)
    }

    async fn borrower_account(&self, actor: &Actor) -> Result<AccountId, LoanError> {
        self.store
            .find_account_by_user(actor.tenant_id, actor.user_id)
            .await?
            .map(|account| account.id)
            .ok_or(LoanError::NoAccount)
    }
}

fn require_staff(actor: &Actor) -> Result<(), LoanError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(LoanError::Forbidden("teacher role required".to_string()))
    }
}

async fn apply_in(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    account_id: AccountId,
    quote: &LoanQuote,
    now: DateTime<Utc>,
) -> Result<Loan, LoanError> {
    let account = unit
        .lock_account(tenant, account_id)
        .await?
        .ok_or(LoanError::NoAccount)?;
    if account.is_frozen() {
        return Err(LoanError::AccountFrozenNegative);
    }
    if let Some(open) = unit.open_loans_for(tenant, account.id).await?.first() {
        return Err(LoanError::LoanAlreadyOpen(open.id));
    }

    let loan = Loan {
        id: LoanId::new(),
        tenant_id: tenant,
        borrower: account.id,
        amount: quote.amount,
        term_weeks: quote.term_weeks,
        interest_rate: quote.interest_rate,
        total_repayable: quote.total_repayable,
        weekly_payment: quote.weekly_payment,
        outstanding_balance: Decimal::ZERO,
        status: LoanStatus::Pending,
        next_payment_date: None,
        due_date: None,
        decided_by: None,
        created_at: now,
        approved_at: None,
        updated_at: now,
    };
    unit.insert_loan(&loan).await?;
    Ok(loan)
}

async fn approve_in(
    unit: &mut dyn LedgerUnit,
    actor: &Actor,
    loan_id: LoanId,
    now: DateTime<Utc>,
) -> Result<Loan, LoanError> {
    let mut loan = lock_loan(unit, actor.tenant_id, loan_id).await?;
    if loan.status != LoanStatus::Pending {
        return Err(LoanError::InvalidTransition {
            from: loan.status,
            to: LoanStatus::Approved,
        });
    }
    loan.status = LoanStatus::Approved;

    LedgerEngine::apply_in(
        unit,
        &MovementRequest {
            tenant_id: actor.tenant_id,
            movement: Movement::Credit {
                to: Party::Account(loan.borrower),
            },
            amount: loan.amount,
            kind: TransactionKind::LoanDisbursement,
            description: format!("Loan {} disbursement", loan.id),
        },
        now,
    )
    .await?;

    let first_payment = schedule::first_payment_date(now.date_naive());
    loan.status = LoanStatus::Active;
    loan.outstanding_balance = loan.total_repayable;
    loan.next_payment_date = Some(first_payment);
    loan.due_date = Some(schedule::due_date(first_payment, loan.term_weeks));
    loan.decided_by = Some(actor.user_id);
    loan.approved_at = Some(now);
    loan.updated_at = now;
    unit.update_loan(&loan).await?;
    Ok(loan)
}

async fn deny_in(
    unit: &mut dyn LedgerUnit,
    actor: &Actor,
    loan_id: LoanId,
    now: DateTime<Utc>,
) -> Result<Loan, LoanError> {
    let mut loan = lock_loan(unit, actor.tenant_id, loan_id).await?;
    if loan.status != LoanStatus::Pending {
        return Err(LoanError::InvalidTransition {
            from: loan.status,
            to: LoanStatus::Denied,
        });
    }
    loan.status = LoanStatus::Denied;
    loan.decided_by = Some(actor.user_id);
    loan.updated_at = now;
    unit.update_loan(&loan).await?;
    Ok(loan)
}

async fn settle_in(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    loan_id: LoanId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Option<SettledLoan>, LoanError> {
    let Some(mut loan) = unit.lock_loan(tenant, loan_id).await? else {
        return Ok(None);
    };
    let due = loan.status == LoanStatus::Active
        && loan.next_payment_date.is_some_and(|date| date <= today);
    if !due {
        return Ok(None);
    }

    let amount = schedule::installment(loan.weekly_payment, loan.outstanding_balance);
    if amount <= Decimal::ZERO {
        loan.status = LoanStatus::PaidOff;
        loan.next_payment_date = None;
        loan.updated_at = now;
        unit.update_loan(&loan).await?;
        return Ok(Some(SettledLoan {
            loan_id: loan.id,
            amount: Decimal::ZERO,
            outstanding_after: loan.outstanding_balance,
            paid_off: true,
        }));
    }

    let receipt = LedgerEngine::apply_in(
        unit,
        &MovementRequest {
            tenant_id: tenant,
            movement: Movement::Debit {
                from: Party::Account(loan.borrower),
                policy: DebitPolicy::Overdraft,
            },
            amount,
            kind: TransactionKind::LoanRepayment,
            description: format!("Scheduled repayment for loan {}", loan.id),
        },
        now,
    )
    .await?;

    let payment = record_payment(
        unit,
        &mut loan,
        amount,
        transaction_id(&receipt)?,
        PaymentSource::Scheduled,
        now,
    )
    .await?;
    if loan.status == LoanStatus::Active {
        loan.next_payment_date = loan
            .next_payment_date
            .map(|date| date + Duration::weeks(1));
    }
    unit.update_loan(&loan).await?;

    Ok(Some(SettledLoan {
        loan_id: loan.id,
        amount,
        outstanding_after: payment.outstanding_after,
        paid_off: loan.status == LoanStatus::PaidOff,
    }))
}

async fn manual_in(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    account: AccountId,
    loan_id: LoanId,
    requested: Option<Decimal>,
    policy: &LoanPolicy,
    now: DateTime<Utc>,
) -> Result<LoanPayment, LoanError> {
    let mut loan = lock_loan(unit, tenant, loan_id).await?;
    if loan.borrower != account {
        return Err(LoanError::Forbidden(
            "only the borrower may repay a loan".to_string(),
        ));
    }
    if loan.status != LoanStatus::Active {
        return Err(LoanError::NotActive(loan.status));
    }
    if let Some(last) = unit.last_manual_payment_at(loan.id).await? {
        let elapsed = now - last;
        if elapsed < policy.payment_cooldown {
            let retry_after_secs = (policy.payment_cooldown - elapsed).num_seconds().max(1);
            return Err(LoanError::PaymentCooldown { retry_after_secs });
        }
    }

    let amount = requested.map_or(loan.outstanding_balance, |amount| {
        amount.min(loan.outstanding_balance)
    });
    let receipt = LedgerEngine::apply_in(
        unit,
        &MovementRequest {
            tenant_id: tenant,
            movement: Movement::Debit {
                from: Party::Account(account),
                policy: DebitPolicy::Ordinary,
            },
            amount,
            kind: TransactionKind::LoanRepayment,
            description: format!("Payment on loan {}", loan.id),
        },
        now,
    )
    .await?;

    let payment = record_payment(
        unit,
        &mut loan,
        amount,
        transaction_id(&receipt)?,
        PaymentSource::Manual,
        now,
    )
    .await?;
    unit.update_loan(&loan).await?;
    Ok(payment)
}

async fn lock_loan(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    loan_id: LoanId,
) -> Result<Loan, LoanError> {
    unit.lock_loan(tenant, loan_id)
        .await?
        .ok_or(LoanError::LoanNotFound(loan_id))
}

/// Inserts the payment and recomputes the cached outstanding balance from the
/// payment sum. The caller persists `loan`.
async fn record_payment(
    unit: &mut dyn LedgerUnit,
    loan: &mut Loan,
    amount: Decimal,
    transaction_id: TransactionId,
    source: PaymentSource,
    now: DateTime<Utc>,
) -> Result<LoanPayment, LoanError> {
    let paid_before = unit.loan_payments_total(loan.id).await?;
    let outstanding = loan.total_repayable - (paid_before + amount);

    let payment = LoanPayment {
        id: LoanPaymentId::new(),
        tenant_id: loan.tenant_id,
        loan_id: loan.id,
        transaction_id,
        amount,
        source,
        outstanding_after: outstanding,
        created_at: now,
    };
    unit.insert_loan_payment(&payment).await?;

    loan.outstanding_balance = outstanding;
    if is_settled(outstanding) {
        loan.status = LoanStatus::PaidOff;
        loan.next_payment_date = None;
    }
    loan.updated_at = now;
    Ok(payment)
}

fn transaction_id(receipt: &MovementReceipt) -> Result<TransactionId, LoanError> {
    receipt
        .transaction
        .as_ref()
        .map(|tx| tx.id)
        .ok_or_else(|| {
            LoanError::Store(StoreError::Database(
                "repayment wrote no transaction".to_string(),
            ))
        })
}

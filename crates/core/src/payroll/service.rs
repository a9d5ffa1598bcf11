//! Weekly class payroll.
//!
//! Pay is computed up front, checked against the class treasury without
//! locking, and then paid in one unit: the treasury is locked and debited once
//! for the net total, every student is credited, and the tax kept back is
//! recorded as a retention row with one tax transaction per taxed student.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use classbank_shared::types::{PayrollRunId, TaxTransactionId, TenantId, TreasuryTransactionId};
use rust_decimal::Decimal;
use tracing::info;

use super::error::PayrollError;
use super::salary::gross_salary;
use super::tax::tax_for;
use super::types::{PaySlip, PayrollKind, PayrollReport, PayrollRun, RosterMember, TaxTransaction};
use crate::actor::Actor;
use crate::clock::Clock;
use crate::ledger::{
    DisburseRequest, Disbursement, LedgerEngine, LedgerError, TransactionKind, TreasuryFlow,
    TreasuryKey, TreasuryScope, TreasuryTransaction,
};
use crate::settings::{SettingsProvider, TownSettings};
use crate::store::{EconomyStore, LedgerUnit, complete};

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn period_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Computes salary slips for employed members. Members whose net is zero are
/// left out.
#[must_use]
pub fn salary_slips(roster: &[RosterMember], town: &TownSettings) -> Vec<PaySlip> {
    roster
        .iter()
        .filter_map(|member| {
            let employment = member.employment.as_ref()?;
            let gross = gross_salary(employment);
            let tax = tax_for(gross, town);
            Some(PaySlip {
                account_id: member.account_id,
                user_id: member.user_id,
                gross,
                tax,
                net: gross - tax,
            })
        })
        .filter(|slip| slip.net > Decimal::ZERO)
        .collect()
}

/// Computes basic-salary slips for members without a job.
#[must_use]
pub fn basic_slips(roster: &[RosterMember], basic_salary: Decimal) -> Vec<PaySlip> {
    roster
        .iter()
        .filter(|member| member.employment.is_none())
        .map(|member| PaySlip {
            account_id: member.account_id,
            user_id: member.user_id,
            gross: basic_salary,
            tax: Decimal::ZERO,
            net: basic_salary,
        })
        .collect()
}

/// Payroll operations.
#[derive(Clone)]
pub struct PayrollService {
    store: Arc<dyn EconomyStore>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl PayrollService {
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

    /// Computes this week's salary slips without paying them.
    ///
    /// # Errors
    ///
    /// Returns `PayrollError::Forbidden` for students.
    pub async fn preview_salaries(
        &self,
        actor: &Actor,
        class_name: &str,
    ) -> Result<Vec<PaySlip>, PayrollError> {
        require_staff(actor)?;
        let town = self
            .settings
            .town_settings(actor.tenant_id, class_name)
            .await?;
        let roster = self.store.class_roster(actor.tenant_id, class_name).await?;
        Ok(salary_slips(&roster, &town))
    }

    /// Pays this week's taxed job salaries for a class.
    ///
    /// # Errors
    ///
    /// Returns a `PayrollError`; nothing is paid unless every student is.
    pub async fn run_salaries(
        &self,
        actor: &Actor,
        class_name: &str,
    ) -> Result<PayrollReport, PayrollError> {
        require_staff(actor)?;
        let tenant = actor.tenant_id;
        let town = self.settings.town_settings(tenant, class_name).await?;
        let roster = self.roster(tenant, class_name).await?;
        let slips = salary_slips(&roster, &town);
        self.pay(tenant, class_name, PayrollKind::Salary, slips).await
    }

    /// Pays this week's flat basic salary to every student without a job.
    ///
    /// # Errors
    ///
    /// Returns `PayrollError::BasicSalaryDisabled` when the town pays none,
    /// otherwise as [`PayrollService::run_salaries`].
    pub async fn run_basic_salaries(
        &self,
        actor: &Actor,
        class_name: &str,
    ) -> Result<PayrollReport, PayrollError> {
        require_staff(actor)?;
        let tenant = actor.tenant_id;
        let town = self.settings.town_settings(tenant, class_name).await?;
        if town.basic_salary <= Decimal::ZERO {
            return Err(PayrollError::BasicSalaryDisabled(class_name.to_string()));
        }
        let roster = self.roster(tenant, class_name).await?;
        let slips = basic_slips(&roster, town.basic_salary);
        self.pay(tenant, class_name, PayrollKind::Basic, slips).await
    }

    async fn roster(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<Vec<RosterMember>, PayrollError> {
        let roster = self.store.class_roster(tenant, class_name).await?;
        if roster.is_empty() {
            return Err(PayrollError::EmptyRoster(class_name.to_string()));
        }
        Ok(roster)
    }

    async fn pay(
        &self,
        tenant: TenantId,
        class_name: &str,
        kind: PayrollKind,
        slips: Vec<PaySlip>,
    ) -> Result<PayrollReport, PayrollError> {
        if slips.is_empty() {
            return Err(PayrollError::NothingToPay(class_name.to_string()));
        }
        let required: Decimal = slips.iter().map(|slip| slip.net).sum();

        let key = TreasuryKey::class(tenant, class_name);
        let available = self
            .store
            .find_treasury(&key)
            .await?
            .map_or(Decimal::ZERO, |treasury| treasury.balance);
        if available < required {
            return Err(PayrollError::TreasuryShortfall {
                available,
                required,
            });
        }

        let now = self.clock.now();
        let mut unit = self.store.begin().await?;
        let result = pay_in(unit.as_mut(), &key, class_name, kind, &slips, now).await;
        let (run, treasury_balance) = complete(unit, result).await?;

        info!(
            tenant_id = %tenant,
            class = class_name,
            kind = kind.as_str(),
            period_start = %run.period_start,
            paid = run.paid_count,
            net = %run.total_net,
            tax = %run.total_tax,
            "Payroll run completed"
        );
        Ok(PayrollReport {
            run,
            slips,
            treasury_balance,
        })
    }
}

fn require_staff(actor: &Actor) -> Result<(), PayrollError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(PayrollError::Forbidden("teacher role required".to_string()))
    }
}

async fn pay_in(
    unit: &mut dyn LedgerUnit,
    key: &TreasuryKey,
    class_name: &str,
    kind: PayrollKind,
    slips: &[PaySlip],
    now: DateTime<Utc>,
) -> Result<(PayrollRun, Decimal), PayrollError> {
    let tenant = key.tenant_id;
    let treasury = unit.lock_treasury(key).await?;

    let week = period_start(now.date_naive());
    if unit
        .find_payroll_run(tenant, class_name, kind, week)
        .await?
        .is_some()
    {
        return Err(PayrollError::AlreadyPaid {
            class_name: class_name.to_string(),
            period_start: week,
        });
    }

    let run = PayrollRun {
        id: PayrollRunId::new(),
        tenant_id: tenant,
        class_name: class_name.to_string(),
        kind,
        period_start: week,
        total_gross: slips.iter().map(|slip| slip.gross).sum(),
        total_tax: slips.iter().map(|slip| slip.tax).sum(),
        total_net: slips.iter().map(|slip| slip.net).sum(),
        paid_count: u32::try_from(slips.len()).unwrap_or(u32::MAX),
        created_at: now,
    };
    unit.insert_payroll_run(&run).await?;

    let (transaction_kind, label) = match kind {
        PayrollKind::Salary => (TransactionKind::Salary, "Salary"),
        PayrollKind::Basic => (TransactionKind::BasicSalary, "Basic salary"),
    };
    let request = DisburseRequest {
        tenant_id: tenant,
        scope: key.scope.clone(),
        kind: transaction_kind,
        description: format!("{label} for {class_name}, week of {week}"),
        credits: slips
            .iter()
            .map(|slip| Disbursement {
                account_id: slip.account_id,
                amount: slip.net,
                description: format!("{label}, week of {week}"),
            })
            .collect(),
        payroll_run_id: Some(run.id),
    };
    let receipt = LedgerEngine::disburse_in(unit, &request, now)
        .await
        .map_err(|e| match e {
            LedgerError::TreasuryInsufficientFunds {
                available,
                requested,
                ..
            } => PayrollError::TreasuryShortfall {
                available,
                required: requested,
            },
            other => PayrollError::Ledger(other),
        })?;

    if run.total_tax > Decimal::ZERO {
        let retention = TreasuryTransaction {
            id: TreasuryTransactionId::new(),
            tenant_id: tenant,
            treasury_id: treasury.id,
            scope: TreasuryScope::Class(class_name.to_string()),
            flow: TreasuryFlow::Retention,
            amount: run.total_tax,
            kind: TransactionKind::Tax,
            description: format!("Tax retained for {class_name}, week of {week}"),
            counterparty_account: None,
            payroll_run_id: Some(run.id),
            created_at: now,
        };
        unit.insert_treasury_transaction(&retention).await?;

        for slip in slips.iter().filter(|slip| slip.tax > Decimal::ZERO) {
            unit.insert_tax_transaction(&TaxTransaction {
                id: TaxTransactionId::new(),
                tenant_id: tenant,
                account_id: slip.account_id,
                payroll_run_id: run.id,
                treasury_transaction_id: retention.id,
                gross: slip.gross,
                tax: slip.tax,
                net: slip.net,
                created_at: now,
            })
            .await?;
        }
    }

    Ok((run, receipt.treasury_balance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case((2026, 3, 4), (2026, 3, 2))]
    #[case((2026, 3, 2), (2026, 3, 2))]
    #[case((2026, 3, 8), (2026, 3, 2))]
    #[case((2027, 1, 1), (2026, 12, 28))]
    fn test_period_start_is_iso_monday(#[case] day: (i32, u32, u32), #[case] monday: (i32, u32, u32)) {
        let date = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(period_start(date(day)), date(monday));
    }
}

//! Loan pricing and repayment schedule.

use chrono::{Datelike, Duration, NaiveDate};
use classbank_shared::types::{ceil_money, is_whole_cents, round_money, within_money_range};
use rust_decimal::Decimal;

use super::error::LoanError;
use super::types::LoanQuote;
use crate::settings::LoanPolicy;

/// Interest rate for a term, from the first tier covering it.
///
/// # Errors
///
/// Returns `LoanError::InvalidTerm` for zero or a term beyond the last tier.
pub fn interest_rate_for(term_weeks: u32, policy: &LoanPolicy) -> Result<Decimal, LoanError> {
    let invalid = || LoanError::InvalidTerm {
        term_weeks,
        max_weeks: policy.max_term_weeks(),
    };
    if term_weeks == 0 {
        return Err(invalid());
    }
    policy
        .interest_tiers
        .iter()
        .find(|tier| term_weeks <= tier.max_weeks)
        .map(|tier| tier.rate)
        .ok_or_else(invalid)
}

/// Prices a loan.
///
/// `total = round2(amount * (1 + rate))`, `weekly = ceil2(total / term)`, so
/// `term` installments always cover the total. Both the principal and the
/// total must fit the stored money range.
///
/// # Errors
///
/// Returns `LoanError::InvalidAmount` or `LoanError::InvalidTerm`.
pub fn quote(amount: Decimal, term_weeks: u32, policy: &LoanPolicy) -> Result<LoanQuote, LoanError> {
    if amount <= Decimal::ZERO || !is_whole_cents(amount) || !within_money_range(amount) {
        return Err(LoanError::InvalidAmount(amount));
    }
    let interest_rate = interest_rate_for(term_weeks, policy)?;
    let total_repayable = amount
        .checked_mul(Decimal::ONE + interest_rate)
        .map(round_money)
        .filter(|total| within_money_range(*total))
        .ok_or(LoanError::InvalidAmount(amount))?;
    let weekly_payment = ceil_money(total_repayable / Decimal::from(term_weeks));
    Ok(LoanQuote {
        amount,
        term_weeks,
        interest_rate,
        total_repayable,
        weekly_payment,
    })
}

/// Largest installment a weekly gross salary can carry.
#[must_use]
pub fn affordability_limit(weekly_gross: Decimal, policy: &LoanPolicy) -> Decimal {
    round_money(weekly_gross * policy.max_payment_ratio)
}

/// First installment date: the Monday strictly after `approved_on`.
#[must_use]
pub fn first_payment_date(approved_on: NaiveDate) -> NaiveDate {
    let days_past_monday = i64::from(approved_on.weekday().num_days_from_monday());
    approved_on + Duration::days(7 - days_past_monday)
}

/// Date of the last scheduled installment.
#[must_use]
pub fn due_date(first_payment: NaiveDate, term_weeks: u32) -> NaiveDate {
    first_payment + Duration::weeks(i64::from(term_weeks.saturating_sub(1)))
}

/// Installment taken by a scheduled settlement.
#[must_use]
pub fn installment(weekly_payment: Decimal, outstanding: Decimal) -> Decimal {
    weekly_payment.min(outstanding)
}

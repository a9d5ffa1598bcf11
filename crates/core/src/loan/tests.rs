//! Loan lifecycle tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::LoanError;
use super::service::LoanService;
use super::types::{LoanStatus, PaymentSource};
use crate::ledger::types::Account;
use crate::ledger::{LedgerError, TransactionKind};
use crate::store::{AccountRepository, LedgerStore, LoanRepository};
use crate::test_support::Fixture;

fn service(fx: &Fixture) -> LoanService {
    LoanService::new(fx.store.clone(), fx.settings(), fx.clock())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn set_date(fx: &Fixture, day: NaiveDate) {
    fx.clock
        .set(Utc.from_utc_datetime(&day.and_hms_opt(6, 0, 0).unwrap()));
}

async fn employed_borrower(fx: &Fixture, balance: Decimal) -> Account {
    let account = fx.account_with(balance).await;
    fx.employ(&account, dec!(2000)).await;
    account
}

#[tokio::test]
async fn test_quote_uses_term_tier() {
    let fx = Fixture::new();
    let quote = service(&fx).quote(fx.tenant, dec!(5000), 8).await.unwrap();
    assert_eq!(quote.interest_rate, dec!(0.08));
    assert_eq!(quote.total_repayable, dec!(5400));
    assert_eq!(quote.weekly_payment, dec!(675));

    let err = service(&fx).quote(fx.tenant, dec!(5000), 13).await.unwrap_err();
    assert!(matches!(err, LoanError::InvalidTerm { term_weeks: 13, max_weeks: 12 }));
}

#[tokio::test]
async fn test_full_lifecycle_converges() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);

    let loan = loans.apply(&fx.student(&borrower), dec!(5000), 8).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.outstanding_balance, Decimal::ZERO);
    assert_eq!(fx.balance(&borrower).await, Decimal::ZERO);

    let teacher = fx.teacher();
    let loan = loans.approve(&teacher, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.outstanding_balance, dec!(5400));
    assert_eq!(loan.next_payment_date, Some(date(2026, 3, 9)));
    assert_eq!(loan.due_date, Some(date(2026, 4, 27)));
    assert_eq!(loan.decided_by, Some(teacher.user_id));
    assert_eq!(fx.balance(&borrower).await, dec!(5000));

    let history = fx
        .memory
        .list_transactions(fx.tenant, borrower.id, Default::default())
        .await
        .unwrap();
    assert_eq!(history.data[0].kind, TransactionKind::LoanDisbursement);

    let mut day = date(2026, 3, 9);
    for week in 1..=8 {
        set_date(&fx, day);
        let report = loans.settle_due(Some(fx.tenant)).await.unwrap();
        assert_eq!(report.settled.len(), 1, "week {week}");
        assert!(report.failures.is_empty());
        day += Duration::weeks(1);
    }

    let loan = loans.get_loan(&teacher, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::PaidOff);
    assert_eq!(loan.outstanding_balance, Decimal::ZERO);
    assert_eq!(loan.next_payment_date, None);
    assert_eq!(fx.balance(&borrower).await, dec!(-400));

    let payments = loans.payments(&teacher, loan.id).await.unwrap();
    assert_eq!(payments.len(), 8);
    assert!(payments.iter().all(|p| p.source == PaymentSource::Scheduled));
    assert_eq!(payments.iter().map(|p| p.amount).sum::<Decimal>(), dec!(5400));

    let entries = loans.reconcile(&teacher).await.unwrap();
    assert!(entries.iter().all(|entry| entry.consistent));

    set_date(&fx, day);
    let report = loans.settle_due(Some(fx.tenant)).await.unwrap();
    assert!(report.settled.is_empty());
}

#[tokio::test]
async fn test_settlement_not_due_before_first_monday() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();

    set_date(&fx, date(2026, 3, 8));
    let report = loans.settle_due(None).await.unwrap();
    assert!(report.settled.is_empty());
    assert_eq!(fx.balance(&borrower).await, dec!(1000));
}

#[tokio::test]
async fn test_settlement_advances_one_week_per_run() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();

    // Three weeks late: a single run still takes a single installment.
    set_date(&fx, date(2026, 3, 30));
    let report = loans.settle_due(None).await.unwrap();
    assert_eq!(report.settled.len(), 1);
    assert_eq!(report.settled[0].amount, dec!(262.50));

    let loan = fx.memory.find_loan(fx.tenant, loan.id).await.unwrap().unwrap();
    assert_eq!(loan.next_payment_date, Some(date(2026, 3, 16)));
    assert_eq!(loan.outstanding_balance, dec!(787.50));
}

#[tokio::test]
async fn test_settlement_failure_is_reported_and_retried() {
    let fx = Fixture::with_lock_timeout(StdDuration::from_millis(50));
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();
    set_date(&fx, date(2026, 3, 9));

    let mut blocker = fx.store.begin().await.unwrap();
    blocker.lock_account(fx.tenant, borrower.id).await.unwrap();

    let report = loans.settle_due(None).await.unwrap();
    assert!(report.settled.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].loan_id, loan.id);
    assert_eq!(report.failures[0].code, "LOCK_TIMEOUT");

    blocker.rollback().await.unwrap();
    let unchanged = fx.memory.find_loan(fx.tenant, loan.id).await.unwrap().unwrap();
    assert_eq!(unchanged.outstanding_balance, dec!(1050));

    let report = loans.settle_due(None).await.unwrap();
    assert_eq!(report.settled.len(), 1);
}

#[tokio::test]
async fn test_settlement_on_frozen_account_is_reported() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();
    fx.memory
        .seed_account_balance(borrower.id, dec!(-10))
        .await
        .unwrap();
    set_date(&fx, date(2026, 3, 9));

    let report = loans.settle_due(None).await.unwrap();
    assert!(report.settled.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].loan_id, loan.id);
    assert_eq!(report.failures[0].code, "ACCOUNT_FROZEN_NEGATIVE");

    assert_eq!(fx.balance(&borrower).await, dec!(-10));
    let unchanged = fx.memory.find_loan(fx.tenant, loan.id).await.unwrap().unwrap();
    assert_eq!(unchanged.outstanding_balance, dec!(1050));
    assert_eq!(unchanged.next_payment_date, Some(date(2026, 3, 9)));
    assert!(
        loans
            .payments(&fx.student(&borrower), loan.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_amounts_past_money_range_rejected() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);

    for amount in [dec!(1000000000000), Decimal::MAX] {
        let err = loans.quote(fx.tenant, amount, 4).await.unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount(_)));
        let err = loans
            .apply(&fx.student(&borrower), amount, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount(_)));
    }
    assert_eq!(fx.balance(&borrower).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_apply_requires_employment() {
    let fx = Fixture::new();
    let student = fx.account_with(dec!(100)).await;
    let err = service(&fx)
        .apply(&fx.student(&student), dec!(500), 4)
        .await
        .unwrap_err();
    assert!(matches!(err, LoanError::NoEmployment));
}

#[tokio::test]
async fn test_apply_rejects_unaffordable_installment() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    // 5000 over 4 weeks at 5% is 1312.50 a week; the limit is half of 2000.
    let err = service(&fx)
        .apply(&fx.student(&borrower), dec!(5000), 4)
        .await
        .unwrap_err();
    match err {
        LoanError::Unaffordable {
            weekly_payment,
            limit,
        } => {
            assert_eq!(weekly_payment, dec!(1312.50));
            assert_eq!(limit, dec!(1000));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_apply_rejects_frozen_account() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(-5)).await;
    let err = service(&fx)
        .apply(&fx.student(&borrower), dec!(100), 4)
        .await
        .unwrap_err();
    assert!(matches!(err, LoanError::AccountFrozenNegative));
}

#[tokio::test]
async fn test_one_open_loan_per_borrower() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let actor = fx.student(&borrower);

    let first = loans.apply(&actor, dec!(100), 4).await.unwrap();
    let err = loans.apply(&actor, dec!(100), 4).await.unwrap_err();
    assert!(matches!(err, LoanError::LoanAlreadyOpen(id) if id == first.id));

    loans.deny(&fx.teacher(), first.id).await.unwrap();
    loans.apply(&actor, dec!(100), 4).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_applications_open_one_loan() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = Arc::new(service(&fx));
    let actor = fx.student(&borrower);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loans = loans.clone();
        let actor = actor.clone();
        handles.push(tokio::spawn(async move {
            loans.apply(&actor, dec!(200), 4).await
        }));
    }
    let mut opened = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(LoanError::LoanAlreadyOpen(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(loans.list_loans(&actor).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_decisions_require_staff_and_pending() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(100), 4).await.unwrap();

    let err = loans.approve(&fx.student(&borrower), loan.id).await.unwrap_err();
    assert!(matches!(err, LoanError::Forbidden(_)));

    let denied = loans.deny(&fx.teacher(), loan.id).await.unwrap();
    assert_eq!(denied.status, LoanStatus::Denied);
    assert_eq!(fx.balance(&borrower).await, Decimal::ZERO);

    let err = loans.approve(&fx.teacher(), loan.id).await.unwrap_err();
    assert!(matches!(
        err,
        LoanError::InvalidTransition {
            from: LoanStatus::Denied,
            to: LoanStatus::Approved
        }
    ));
}

#[tokio::test]
async fn test_manual_payment_cooldown_and_clamp() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(2000)).await;
    let loans = service(&fx);
    let actor = fx.student(&borrower);
    let loan = loans.apply(&actor, dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();

    let payment = loans.make_payment(&actor, loan.id, dec!(50)).await.unwrap();
    assert_eq!(payment.source, PaymentSource::Manual);
    assert_eq!(payment.outstanding_after, dec!(1000));

    let err = loans.make_payment(&actor, loan.id, dec!(50)).await.unwrap_err();
    assert!(matches!(err, LoanError::PaymentCooldown { retry_after_secs } if retry_after_secs > 0));

    fx.clock.advance(Duration::seconds(31));
    let payment = loans.make_payment(&actor, loan.id, dec!(5000)).await.unwrap();
    assert_eq!(payment.amount, dec!(1000));
    assert_eq!(payment.outstanding_after, Decimal::ZERO);

    let loan = loans.get_loan(&actor, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::PaidOff);
    assert_eq!(fx.balance(&borrower).await, dec!(1950));
}

#[tokio::test]
async fn test_scheduled_settlement_does_not_start_cooldown() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(2000)).await;
    let loans = service(&fx);
    let actor = fx.student(&borrower);
    let loan = loans.apply(&actor, dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();
    set_date(&fx, date(2026, 3, 9));

    let report = loans.settle_due(None).await.unwrap();
    assert_eq!(report.settled.len(), 1);

    let payment = loans.make_payment(&actor, loan.id, dec!(10)).await.unwrap();
    assert_eq!(payment.source, PaymentSource::Manual);
}

#[tokio::test]
async fn test_manual_payment_needs_funds() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(0)).await;
    let loans = service(&fx);
    let actor = fx.student(&borrower);
    let loan = loans.apply(&actor, dec!(1000), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();

    let err = loans.pay_off(&actor, loan.id).await.unwrap_err();
    assert!(matches!(
        err,
        LoanError::Ledger(LedgerError::InsufficientFunds { .. })
    ));
    let loan = loans.get_loan(&actor, loan.id).await.unwrap();
    assert_eq!(loan.outstanding_balance, dec!(1050));
    assert!(loans.payments(&actor, loan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_borrower_pays_and_reads() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(500)).await;
    let other = fx.account_with(dec!(500)).await;
    let loans = service(&fx);
    let loan = loans.apply(&fx.student(&borrower), dec!(100), 4).await.unwrap();
    loans.approve(&fx.teacher(), loan.id).await.unwrap();

    let err = loans
        .make_payment(&fx.student(&other), loan.id, dec!(10))
        .await
        .unwrap_err();
    assert!(matches!(err, LoanError::Forbidden(_)));

    let err = loans.get_loan(&fx.student(&other), loan.id).await.unwrap_err();
    assert!(matches!(err, LoanError::Forbidden(_)));
    assert!(loans.list_loans(&fx.student(&other)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_loan_cannot_be_paid() {
    let fx = Fixture::new();
    let borrower = employed_borrower(&fx, dec!(500)).await;
    let loans = service(&fx);
    let actor = fx.student(&borrower);
    let loan = loans.apply(&actor, dec!(100), 4).await.unwrap();

    let err = loans.pay_off(&actor, loan.id).await.unwrap_err();
    assert!(matches!(err, LoanError::NotActive(LoanStatus::Pending)));
    let account = fx
        .memory
        .find_account(fx.tenant, borrower.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, dec!(500));
}

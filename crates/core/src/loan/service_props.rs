//! Property-based tests for loan repayment.
//!
//! - Scheduled settlement pays a loan off in at most `term` installments whose
//!   sum equals the total repayable.
//! - The cached outstanding balance always equals the total minus payments.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::schedule;
use super::service::LoanService;
use super::types::LoanStatus;
use crate::settings::LoanPolicy;
use crate::store::LoanRepository;
use crate::test_support::Fixture;

/// Strategy for principals between 1.00 and 2000.00.
fn principal() -> impl Strategy<Value = Decimal> {
    (100i64..200_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_installments_cover_total(amount in principal(), term in 1u32..=12) {
        let policy = LoanPolicy::default();
        let quote = schedule::quote(amount, term, &policy).unwrap();
        let mut outstanding = quote.total_repayable;
        let mut paid = Decimal::ZERO;
        for _ in 0..term {
            let installment = schedule::installment(quote.weekly_payment, outstanding);
            prop_assert!(installment >= Decimal::ZERO);
            outstanding -= installment;
            paid += installment;
        }
        prop_assert_eq!(outstanding, Decimal::ZERO);
        prop_assert_eq!(paid, quote.total_repayable);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_settlement_converges(amount in principal(), term in 1u32..=12) {
        let (status, payments, paid, total, outstanding) = run(async {
            let fx = Fixture::new();
            // Covers the interest, so settlement never meets a frozen account.
            let borrower = fx.account_with(Decimal::new(1_000, 0)).await;
            fx.employ(&borrower, Decimal::new(10_000, 0)).await;
            let loans = LoanService::new(fx.store.clone(), fx.settings(), fx.clock());

            let loan = loans.apply(&fx.student(&borrower), amount, term).await.unwrap();
            let loan = loans.approve(&fx.teacher(), loan.id).await.unwrap();
            let mut day = loan.next_payment_date.unwrap();
            for _ in 0..term {
                fx.clock.set(Utc.from_utc_datetime(&day.and_hms_opt(6, 0, 0).unwrap()));
                let report = loans.settle_due(None).await.unwrap();
                assert_eq!(report.settled.len(), 1);
                if report.settled[0].paid_off {
                    break;
                }
                day += Duration::weeks(1);
            }

            let loan = fx.memory.find_loan(fx.tenant, loan.id).await.unwrap().unwrap();
            let payments = fx.memory.loan_payments(fx.tenant, loan.id).await.unwrap();
            let paid: Decimal = payments.iter().map(|p| p.amount).sum();
            (loan.status, payments.len(), paid, loan.total_repayable, loan.outstanding_balance)
        });

        prop_assert_eq!(status, LoanStatus::PaidOff);
        prop_assert!(payments <= term as usize);
        prop_assert_eq!(paid, total);
        prop_assert_eq!(outstanding, total - paid);
    }
}

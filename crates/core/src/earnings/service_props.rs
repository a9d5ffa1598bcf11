//! Property-based tests for game submissions.
//!
//! - Money moved equals the reported earnings on success and zero otherwise.
//! - Earnings never exceed the per-session ceiling.
//! - A session is credited at most once whatever is resubmitted.
//! - Omitted result claims never pay.

use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::service::EarningsService;
use super::types::{Difficulty, Submission};
use crate::test_support::{DoublingProblems, Fixture};

fn difficulty() -> impl Strategy<Value = Difficulty> {
    prop_oneof![
        Just(Difficulty::Easy),
        Just(Difficulty::Medium),
        Just(Difficulty::Hard),
    ]
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_credit_matches_outcome(
        right in prop::collection::vec(any::<bool>(), 1..40),
        report_claims in any::<bool>(),
        difficulty in difficulty(),
        elapsed_secs in 0i64..120,
        retries in 1usize..4,
    ) {
        let (credited, moved, cap) = run(async {
            let fx = Fixture::new();
            fx.fund_class(Decimal::new(100_000, 0)).await;
            let student = fx.account_with(Decimal::ZERO).await;
            let actor = fx.student(&student);
            let games = EarningsService::new(fx.store.clone(), fx.settings(), fx.clock())
                .with_problem_source(Arc::new(DoublingProblems));

            let start = games
                .start_session(&actor, "quiz", difficulty, right.len())
                .await
                .unwrap();
            fx.clock.advance(Duration::seconds(elapsed_secs));

            let submission = Submission {
                session_id: start.session_id,
                answers: right
                    .iter()
                    .enumerate()
                    .map(|(i, ok)| if *ok { format!(" {} ", (i + 1) * 2) } else { "wrong".to_string() })
                    .collect(),
                claimed_results: if report_claims { right.clone() } else { vec![] },
                claimed_score: Some(9999),
            };

            let mut credited = Decimal::ZERO;
            for _ in 0..retries {
                if let Ok(outcome) = games.submit(&actor, &submission).await {
                    credited += outcome.earnings;
                }
            }
            let moved = fx.balance(&student).await;
            let treasury_drop = Decimal::new(100_000, 0) - fx.class_balance().await;
            assert_eq!(moved, treasury_drop);
            (credited, moved, Decimal::new(200, 0))
        });

        prop_assert_eq!(credited, moved);
        prop_assert!(moved <= cap);
        prop_assert!(moved >= Decimal::ZERO);
    }
}

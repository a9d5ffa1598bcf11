//! Property-based tests for the ledger engine.
//!
//! - Conservation: movements between accounts and a treasury never create or
//!   destroy money.
//! - Ordinary debits never drive an account or a treasury below zero.
//! - Rejected movements leave every balance unchanged.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::engine::LedgerEngine;
use super::types::{DebitPolicy, Movement, MovementRequest, Party, TransactionKind, TreasuryScope};
use crate::ledger::types::Account;
use crate::test_support::{CLASS, Fixture};

/// Strategy to generate amounts between 0.01 and 200.00.
fn amount() -> impl Strategy<Value = Decimal> {
    (1i64..20_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for a party index: 0..3 are accounts, 3 is the class treasury.
fn party_index() -> impl Strategy<Value = usize> {
    0usize..4
}

fn party(accounts: &[Account], index: usize) -> Party {
    accounts
        .get(index)
        .map_or(Party::Treasury(TreasuryScope::class(CLASS)), |account| {
            Party::Account(account.id)
        })
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
    fn prop_transfers_conserve_money(
        moves in prop::collection::vec((party_index(), party_index(), amount()), 1..25),
    ) {
        let (total_before, total_after, min_account, treasury) = run(async {
            let fx = Fixture::new();
            fx.fund_class(Decimal::new(500, 0)).await;
            let mut accounts = Vec::new();
            for _ in 0..3 {
                accounts.push(fx.account_with(Decimal::new(100, 0)).await);
            }
            let engine = LedgerEngine::new(fx.store.clone(), fx.clock());

            for (from, to, amount) in moves {
                let request = MovementRequest {
                    tenant_id: fx.tenant,
                    movement: Movement::Transfer {
                        from: party(&accounts, from),
                        to: party(&accounts, to),
                        policy: DebitPolicy::Ordinary,
                    },
                    amount,
                    kind: TransactionKind::Transfer,
                    description: "prop".to_string(),
                };
                let _ = engine.apply(&request).await;
            }

            let mut balances = Vec::new();
            for account in &accounts {
                balances.push(fx.balance(account).await);
            }
            let treasury = fx.class_balance().await;
            let total_after: Decimal = balances.iter().copied().sum::<Decimal>() + treasury;
            let min_account = balances.iter().copied().min().unwrap_or_default();
            (Decimal::new(800, 0), total_after, min_account, treasury)
        });

        prop_assert_eq!(total_before, total_after);
        prop_assert!(min_account >= Decimal::ZERO);
        prop_assert!(treasury >= Decimal::ZERO);
    }

    #[test]
    fn prop_rejected_debit_changes_nothing(
        balance in 0i64..10_000,
        extra in 1i64..10_000,
    ) {
        let balance = Decimal::new(balance, 2);
        let requested = balance + Decimal::new(extra, 2);

        let (from_after, to_after, rejected) = run(async {
            let fx = Fixture::new();
            let from = fx.account_with(balance).await;
            let to = fx.account_with(Decimal::ZERO).await;
            let engine = LedgerEngine::new(fx.store.clone(), fx.clock());

            let result = engine
                .apply(&MovementRequest {
                    tenant_id: fx.tenant,
                    movement: Movement::Transfer {
                        from: Party::Account(from.id),
                        to: Party::Account(to.id),
                        policy: DebitPolicy::Ordinary,
                    },
                    amount: requested,
                    kind: TransactionKind::Transfer,
                    description: "prop".to_string(),
                })
                .await;
            (fx.balance(&from).await, fx.balance(&to).await, result.is_err())
        });

        prop_assert!(rejected);
        prop_assert_eq!(from_after, balance);
        prop_assert_eq!(to_after, Decimal::ZERO);
    }
}

//! Fixtures shared by the unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use classbank_shared::types::{TenantId, UserId};
use rust_decimal::Decimal;

use crate::actor::{Actor, Role};
use crate::clock::{Clock, ManualClock};
use crate::earnings::{Difficulty, EarningsError, Problem, ProblemSource};
use crate::ledger::types::{Account, TreasuryKey};
use crate::payroll::types::{Employment, RosterMember};
use crate::settings::{SettingsProvider, StaticSettings};
use crate::store::{
    AccountRepository, EconomyStore, MemoryStore, RosterRepository, TreasuryRepository,
};
use classbank_shared::EconomyConfig;

pub const CLASS: &str = "6A";

/// Problem `n` is `"n x 2"` with answer `2n`, counting from 1.
pub struct DoublingProblems;

impl ProblemSource for DoublingProblems {
    fn generate(
        &self,
        _game: &str,
        _difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Problem>, EarningsError> {
        Ok((1..=count)
            .map(|i| Problem {
                prompt: format!("{i} x 2"),
                answer: (i * 2).to_string(),
            })
            .collect())
    }
}

/// Wednesday 2026-03-04 09:00 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap()
}

pub struct Fixture {
    pub memory: MemoryStore,
    pub store: Arc<dyn EconomyStore>,
    pub clock: Arc<ManualClock>,
    pub tenant: TenantId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_memory(MemoryStore::new())
    }

    pub fn with_lock_timeout(timeout: std::time::Duration) -> Self {
        Self::with_memory(MemoryStore::with_lock_timeout(timeout))
    }

    fn with_memory(memory: MemoryStore) -> Self {
        Self {
            store: Arc::new(memory.clone()),
            memory,
            clock: Arc::new(ManualClock::new(start_time())),
            tenant: TenantId::new(),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn settings(&self) -> Arc<dyn SettingsProvider> {
        StaticSettings::from_config(&EconomyConfig::default())
            .unwrap()
            .shared()
    }

    pub async fn account_with(&self, balance: Decimal) -> Account {
        let account = self
            .memory
            .open_account(self.tenant, UserId::new())
            .await
            .unwrap();
        self.memory
            .seed_account_balance(account.id, balance)
            .await
            .unwrap()
    }

    /// Puts the account on the class roster with a level 1 job.
    pub async fn employ(&self, account: &Account, base_pay: Decimal) {
        self.enroll(
            account,
            Some(Employment {
                job_title: "Banker".to_string(),
                base_pay,
                level: 1,
                contractual: false,
            }),
        )
        .await;
    }

    pub async fn enroll(&self, account: &Account, employment: Option<Employment>) {
        self.memory
            .enroll(
                self.tenant,
                CLASS,
                &RosterMember {
                    account_id: account.id,
                    user_id: account.user_id,
                    employment,
                },
            )
            .await
            .unwrap();
    }

    pub async fn fund_class(&self, balance: Decimal) {
        self.memory
            .seed_treasury(&TreasuryKey::class(self.tenant, CLASS), balance)
            .await;
    }

    pub async fn balance(&self, account: &Account) -> Decimal {
        self.memory
            .find_account(self.tenant, account.id)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    pub async fn class_balance(&self) -> Decimal {
        self.treasury_balance(&TreasuryKey::class(self.tenant, CLASS))
            .await
    }

    pub async fn treasury_balance(&self, key: &TreasuryKey) -> Decimal {
        self.memory
            .find_treasury(key)
            .await
            .unwrap()
            .map_or(Decimal::ZERO, |treasury| treasury.balance)
    }

    pub fn student(&self, account: &Account) -> Actor {
        Actor {
            user_id: account.user_id,
            tenant_id: self.tenant,
            role: Role::Student,
            class_name: Some(CLASS.to_string()),
        }
    }

    pub fn teacher(&self) -> Actor {
        Actor {
            user_id: UserId::new(),
            tenant_id: self.tenant,
            role: Role::Teacher,
            class_name: Some(CLASS.to_string()),
        }
    }
}

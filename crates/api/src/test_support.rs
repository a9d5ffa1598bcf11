//! Router fixtures backed by the in-memory store.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use chrono::{DateTime, TimeZone, Utc};
use classbank_core::ledger::{Account, TreasuryKey};
use classbank_core::payroll::{Employment, RosterMember};
use classbank_core::settings::StaticSettings;
use classbank_core::store::{AccountRepository, MemoryStore, RosterRepository, TreasuryRepository};
use classbank_core::{Actor, ManualClock, Role};
use classbank_shared::types::{TenantId, UserId};
use classbank_shared::{EconomyConfig, JwtConfig, JwtService};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use tower::ServiceExt;

use crate::{AppState, create_router};

pub const CLASS: &str = "6A";

/// Wednesday 2026-03-04 09:00 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap()
}

pub struct TestApp {
    pub memory: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub state: AppState,
    pub tenant: TenantId,
}

impl TestApp {
    pub fn new() -> Self {
        let memory = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(start_time()));
        let settings = StaticSettings::from_config(&EconomyConfig::default())
            .unwrap()
            .shared();
        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret-key-for-testing".to_string(),
            access_token_expires_minutes: 15,
        });
        let state = AppState::new(Arc::new(memory.clone()), settings, clock.clone(), jwt);
        Self {
            memory,
            clock,
            state,
            tenant: TenantId::new(),
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn token(&self, actor: &Actor) -> String {
        self.state
            .jwt_service
            .generate_access_token(
                actor.user_id.into_inner(),
                actor.tenant_id.into_inner(),
                actor.role.as_str(),
                actor.class_name.clone(),
            )
            .unwrap()
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

    pub async fn employ(&self, account: &Account, base_pay: Decimal) {
        self.memory
            .enroll(
                self.tenant,
                CLASS,
                &RosterMember {
                    account_id: account.id,
                    user_id: account.user_id,
                    employment: Some(Employment {
                        job_title: "Banker".to_string(),
                        base_pay,
                        level: 1,
                        contractual: false,
                    }),
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
        self.memory
            .find_treasury(&TreasuryKey::class(self.tenant, CLASS))
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

    /// Sends a request as `actor` and returns the status and JSON body.
    ///
    /// Plain-text bodies, such as extractor rejections, come back as a string.
    pub async fn send(
        &self,
        actor: Option<&Actor>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            request = request.header(AUTHORIZATION, format!("Bearer {}", self.token(actor)));
        }
        let request = match body {
            Some(json) => request
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }
}

/// Reads a decimal rendered as a JSON string.
pub fn money(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

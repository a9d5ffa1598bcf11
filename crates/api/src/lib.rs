//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST routes over the ledger, loan, payroll, and earnings services
//! - Bearer-token middleware turning JWT claims into an [`Actor`]
//! - Mapping of domain errors onto JSON error responses
//!
//! [`Actor`]: classbank_core::Actor

pub mod error;
pub mod middleware;
pub mod routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::Router;
use classbank_core::earnings::EarningsService;
use classbank_core::ledger::AccountService;
use classbank_core::loan::LoanService;
use classbank_core::payroll::PayrollService;
use classbank_core::settings::SettingsProvider;
use classbank_core::store::EconomyStore;
use classbank_core::Clock;
use classbank_shared::JwtService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Accounts, treasuries, and ordinary movements.
    pub accounts: Arc<AccountService>,
    /// Loan lifecycle and settlement.
    pub loans: Arc<LoanService>,
    /// Class payroll runs.
    pub payroll: Arc<PayrollService>,
    /// Game sessions behind the anti-fraud gate.
    pub earnings: Arc<EarningsService>,
    /// JWT service for token verification.
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    /// Wires every service onto one store, settings provider, and clock.
    pub fn new(
        store: Arc<dyn EconomyStore>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(Arc::clone(&store), Arc::clone(&clock))),
            loans: Arc::new(LoanService::new(
                Arc::clone(&store),
                Arc::clone(&settings),
                Arc::clone(&clock),
            )),
            payroll: Arc::new(PayrollService::new(
                Arc::clone(&store),
                Arc::clone(&settings),
                Arc::clone(&clock),
            )),
            earnings: Arc::new(EarningsService::new(store, settings, clock)),
            jwt_service: Arc::new(jwt_service),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

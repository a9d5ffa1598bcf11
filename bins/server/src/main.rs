//! Classbank API Server
//!
//! Main entry point for the classroom economy backend. Also runs the
//! scheduled loan settlement on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classbank_api::{AppState, create_router};
use classbank_core::SystemClock;
use classbank_core::loan::LoanService;
use classbank_core::settings::StaticSettings;
use classbank_db::{PgSettings, PgStore, connect_pool};
use classbank_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classbank=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let db = connect_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    let store = PgStore::with_lock_timeout(
        db.clone(),
        Duration::from_millis(config.database.lock_timeout_ms),
    );
    let settings = PgSettings::new(db, StaticSettings::from_config(&config.economy)?);

    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_minutes: i64::try_from(config.jwt.access_token_expiry_secs / 60)
            .unwrap_or(i64::MAX),
    });

    let state = AppState::new(
        Arc::new(store),
        Arc::new(settings),
        Arc::new(SystemClock),
        jwt_service,
    );

    tokio::spawn(run_settlement(
        Arc::clone(&state.loans),
        Duration::from_secs(config.server.settlement_interval_secs.max(1)),
    ));

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Settles due installments for every tenant, once per tick.
async fn run_settlement(loans: Arc<LoanService>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match loans.settle_due(None).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    warn!(
                        failures = report.failures.len(),
                        "Some loans could not be settled"
                    );
                }
                info!(
                    settled = report.settled.len(),
                    skipped = report.skipped,
                    "Loan settlement finished"
                );
            }
            Err(e) => error!(error = %e, "Loan settlement failed"),
        }
    }
}

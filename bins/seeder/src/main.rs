//! Database seeder for Classbank development and testing.
//!
//! Seeds a demo town with one funded class and five employed students, then
//! prints a teacher token when a JWT secret is configured.
//! Safe to run repeatedly: accounts are opened idempotently and the class is
//! only funded while its treasury is empty.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use classbank_core::ledger::AccountService;
use classbank_core::payroll::{Employment, RosterMember};
use classbank_core::store::RosterRepository;
use classbank_core::{Actor, Role, SystemClock};
use classbank_db::PgStore;
use classbank_shared::types::{Money, TenantId, UserId};
use classbank_shared::{AppConfig, JwtConfig, JwtService};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Demo town (consistent for all seeds)
const DEMO_TENANT_ID: Uuid = Uuid::from_u128(1);
/// Demo teacher (consistent for all seeds)
const DEMO_TEACHER_ID: Uuid = Uuid::from_u128(2);
/// First demo student; the rest follow sequentially.
const FIRST_STUDENT_ID: u128 = 100;

const CLASS_NAME: &str = "6A";
const STUDENT_COUNT: u128 = 5;

const JOBS: [(&str, i64); 5] = [
    ("Banker", 2000),
    ("Librarian", 1500),
    ("Police Officer", 1800),
    ("Shop Keeper", 1200),
    ("Messenger", 900),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

    println!("Connecting to database...");
    let db = classbank_db::connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgStore::new(db));
    let accounts = AccountService::new(store.clone(), Arc::new(SystemClock));

    let tenant = TenantId::from_uuid(DEMO_TENANT_ID);
    let teacher = Actor {
        user_id: UserId::from_uuid(DEMO_TEACHER_ID),
        tenant_id: tenant,
        role: Role::Teacher,
        class_name: Some(CLASS_NAME.to_string()),
    };

    println!("Seeding students...");
    seed_students(&accounts, store.as_ref(), tenant).await?;

    println!("Funding class treasury...");
    seed_treasury(&accounts, &teacher).await?;

    println!("Seeding complete!");
    println!("  Tenant:  {tenant}");
    println!("  Teacher: {}", teacher.user_id);
    print_teacher_token(&teacher)?;
    Ok(())
}

/// Prints a teacher token signed with the configured secret, if one is set.
fn print_teacher_token(teacher: &Actor) -> anyhow::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  No JWT configuration ({e}), skipping teacher token");
            return Ok(());
        }
    };
    let jwt = JwtService::new(JwtConfig {
        secret: config.jwt.secret,
        access_token_expires_minutes: i64::try_from(config.jwt.access_token_expiry_secs / 60)
            .unwrap_or(i64::MAX),
    });
    let token = jwt.generate_access_token(
        teacher.user_id.into_inner(),
        teacher.tenant_id.into_inner(),
        teacher.role.as_str(),
        teacher.class_name.clone(),
    )?;
    println!("  Teacher token: {token}");
    Ok(())
}

/// Opens an account for every demo student and gives each a job.
async fn seed_students(
    accounts: &AccountService,
    roster: &PgStore,
    tenant: TenantId,
) -> anyhow::Result<()> {
    for (offset, (job_title, base_pay)) in (0..STUDENT_COUNT).zip(JOBS) {
        let user = UserId::from_uuid(Uuid::from_u128(FIRST_STUDENT_ID + offset));
        let account = accounts.open_account(tenant, user).await?;
        let member = RosterMember {
            account_id: account.id,
            user_id: user,
            employment: Some(Employment {
                job_title: job_title.to_string(),
                base_pay: Decimal::new(base_pay, 0),
                level: 1,
                contractual: false,
            }),
        };
        roster.enroll(tenant, CLASS_NAME, &member).await?;
        println!(
            "  {user}: {job_title} ({}/week)",
            Money::new(Decimal::new(base_pay, 0))
        );
    }
    Ok(())
}

/// Funds the class with R100000 unless it already holds money.
async fn seed_treasury(accounts: &AccountService, teacher: &Actor) -> anyhow::Result<()> {
    let current = accounts
        .treasury(teacher, CLASS_NAME)
        .await?
        .map_or(Decimal::ZERO, |treasury| treasury.balance);
    if current > Decimal::ZERO {
        println!("  Treasury already holds {}, skipping...", Money::new(current));
        return Ok(());
    }

    let budget = Decimal::new(100_000, 0);
    accounts
        .deposit(teacher, CLASS_NAME, budget, "Demo term budget")
        .await?;
    println!("  Deposited {} into class {CLASS_NAME}", Money::new(budget));
    Ok(())
}

//! Economy schema: accounts, treasuries, both transaction logs, loans,
//! game sessions, payroll runs, and the roster and settings tables read by
//! the services.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: BALANCES
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(TREASURIES_SQL).await?;

        // ============================================================
        // PART 3: PAYROLL
        // ============================================================
        db.execute_unprepared(PAYROLL_RUNS_SQL).await?;

        // ============================================================
        // PART 4: TRANSACTION LOGS
        // ============================================================
        db.execute_unprepared(TRANSACTIONS_SQL).await?;
        db.execute_unprepared(TREASURY_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(TAX_TRANSACTIONS_SQL).await?;

        // ============================================================
        // PART 5: LOANS
        // ============================================================
        db.execute_unprepared(LOANS_SQL).await?;
        db.execute_unprepared(LOAN_PAYMENTS_SQL).await?;

        // ============================================================
        // PART 6: GAMES
        // ============================================================
        db.execute_unprepared(GAME_SESSIONS_SQL).await?;

        // ============================================================
        // PART 7: ROSTER AND SETTINGS
        // ============================================================
        db.execute_unprepared(CLASS_MEMBERS_SQL).await?;
        db.execute_unprepared(TOWN_SETTINGS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE transaction_kind AS ENUM (
    'deposit',
    'withdrawal',
    'transfer',
    'purchase',
    'fine',
    'salary',
    'basic_salary',
    'game_earnings',
    'loan_disbursement',
    'loan_repayment',
    'tax'
);

CREATE TYPE treasury_flow AS ENUM ('inflow', 'outflow', 'retention');

CREATE TYPE loan_status AS ENUM ('pending', 'approved', 'denied', 'active', 'paid_off');

CREATE TYPE payment_source AS ENUM ('scheduled', 'manual');

CREATE TYPE session_status AS ENUM ('open', 'credited', 'completed', 'rejected');

CREATE TYPE difficulty AS ENUM ('easy', 'medium', 'hard');

CREATE TYPE payroll_kind AS ENUM ('salary', 'basic');
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    user_id UUID NOT NULL,
    balance NUMERIC(14, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, user_id)
);

CREATE INDEX idx_accounts_tenant ON accounts(tenant_id);
";

const TREASURIES_SQL: &str = r"
CREATE TABLE treasuries (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    scope VARCHAR(120) NOT NULL,
    balance NUMERIC(14, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, scope),
    CONSTRAINT chk_treasury_not_negative CHECK (balance >= 0),
    CONSTRAINT chk_treasury_scope CHECK (
        scope IN ('shop', 'system') OR scope LIKE 'class:_%'
    )
);
";

const PAYROLL_RUNS_SQL: &str = r"
CREATE TABLE payroll_runs (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    class_name VARCHAR(100) NOT NULL,
    kind payroll_kind NOT NULL,
    period_start DATE NOT NULL,
    total_gross NUMERIC(14, 2) NOT NULL,
    total_tax NUMERIC(14, 2) NOT NULL,
    total_net NUMERIC(14, 2) NOT NULL,
    paid_count INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, class_name, kind, period_start),
    CONSTRAINT chk_payroll_totals CHECK (total_gross = total_tax + total_net),
    CONSTRAINT chk_period_is_monday CHECK (EXTRACT(ISODOW FROM period_start) = 1)
);
";

const TRANSACTIONS_SQL: &str = r"
CREATE TABLE transactions (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    from_account UUID REFERENCES accounts(id),
    to_account UUID REFERENCES accounts(id),
    amount NUMERIC(14, 2) NOT NULL,
    kind transaction_kind NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_transaction_amount CHECK (amount > 0),
    CONSTRAINT chk_transaction_party CHECK (
        from_account IS NOT NULL OR to_account IS NOT NULL
    ),
    CONSTRAINT chk_transaction_distinct CHECK (from_account IS DISTINCT FROM to_account)
);

CREATE INDEX idx_transactions_from ON transactions(tenant_id, from_account, created_at DESC);
CREATE INDEX idx_transactions_to ON transactions(tenant_id, to_account, created_at DESC);
";

const TREASURY_TRANSACTIONS_SQL: &str = r"
CREATE TABLE treasury_transactions (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    treasury_id UUID NOT NULL REFERENCES treasuries(id),
    scope VARCHAR(120) NOT NULL,
    flow treasury_flow NOT NULL,
    amount NUMERIC(14, 2) NOT NULL,
    kind transaction_kind NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    counterparty_account UUID REFERENCES accounts(id),
    payroll_run_id UUID REFERENCES payroll_runs(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_treasury_transaction_amount CHECK (amount > 0)
);

CREATE INDEX idx_treasury_transactions_treasury
    ON treasury_transactions(treasury_id, created_at DESC);
CREATE INDEX idx_treasury_transactions_run ON treasury_transactions(payroll_run_id);
";

const TAX_TRANSACTIONS_SQL: &str = r"
CREATE TABLE tax_transactions (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    payroll_run_id UUID NOT NULL REFERENCES payroll_runs(id),
    treasury_transaction_id UUID NOT NULL REFERENCES treasury_transactions(id),
    gross NUMERIC(14, 2) NOT NULL,
    tax NUMERIC(14, 2) NOT NULL,
    net NUMERIC(14, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_tax_split CHECK (gross = tax + net),
    CONSTRAINT chk_tax_positive CHECK (tax > 0)
);

CREATE INDEX idx_tax_transactions_run ON tax_transactions(payroll_run_id);
";

const LOANS_SQL: &str = r"
CREATE TABLE loans (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    borrower UUID NOT NULL REFERENCES accounts(id),
    amount NUMERIC(14, 2) NOT NULL,
    term_weeks INTEGER NOT NULL,
    interest_rate NUMERIC(6, 4) NOT NULL,
    total_repayable NUMERIC(14, 2) NOT NULL,
    weekly_payment NUMERIC(14, 2) NOT NULL,
    outstanding_balance NUMERIC(14, 2) NOT NULL,
    status loan_status NOT NULL DEFAULT 'pending',
    next_payment_date DATE,
    due_date DATE,
    decided_by UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    approved_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_loan_amount CHECK (amount > 0),
    CONSTRAINT chk_loan_term CHECK (term_weeks > 0),
    CONSTRAINT chk_loan_outstanding CHECK (outstanding_balance >= 0)
);

-- At most one loan per borrower may be pending, approved or active.
CREATE UNIQUE INDEX uq_loans_open_per_borrower
    ON loans(borrower)
    WHERE status IN ('pending', 'approved', 'active');

CREATE INDEX idx_loans_due ON loans(next_payment_date) WHERE status = 'active';
CREATE INDEX idx_loans_tenant ON loans(tenant_id, created_at DESC);
";

const LOAN_PAYMENTS_SQL: &str = r"
CREATE TABLE loan_payments (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    loan_id UUID NOT NULL REFERENCES loans(id),
    transaction_id UUID NOT NULL REFERENCES transactions(id),
    amount NUMERIC(14, 2) NOT NULL,
    source payment_source NOT NULL,
    outstanding_after NUMERIC(14, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_loan_payment_amount CHECK (amount > 0)
);

CREATE INDEX idx_loan_payments_loan ON loan_payments(loan_id, created_at);
";

const GAME_SESSIONS_SQL: &str = r"
CREATE TABLE game_sessions (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    user_id UUID NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    class_name VARCHAR(100) NOT NULL,
    game VARCHAR(100) NOT NULL,
    difficulty difficulty NOT NULL,
    problems JSONB NOT NULL,
    status session_status NOT NULL DEFAULT 'open',
    started_at TIMESTAMPTZ NOT NULL,
    submitted_at TIMESTAMPTZ,
    earnings NUMERIC(14, 2),
    rejection_code VARCHAR(50)
);

CREATE INDEX idx_game_sessions_plays
    ON game_sessions(tenant_id, user_id, submitted_at)
    WHERE status IN ('credited', 'completed');
";

const CLASS_MEMBERS_SQL: &str = r"
CREATE TABLE class_members (
    tenant_id UUID NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    class_name VARCHAR(100) NOT NULL,
    user_id UUID NOT NULL,
    job_title VARCHAR(100),
    base_pay NUMERIC(14, 2),
    level INTEGER,
    contractual BOOLEAN NOT NULL DEFAULT false,
    PRIMARY KEY (tenant_id, account_id),
    CONSTRAINT chk_job_complete CHECK (
        (job_title IS NULL AND base_pay IS NULL AND level IS NULL)
        OR (job_title IS NOT NULL AND base_pay IS NOT NULL AND level IS NOT NULL)
    )
);

CREATE INDEX idx_class_members_class ON class_members(tenant_id, class_name);
";

const TOWN_SETTINGS_SQL: &str = r"
CREATE TABLE town_settings (
    tenant_id UUID NOT NULL,
    class_name VARCHAR(100) NOT NULL,
    taxation_enabled BOOLEAN NOT NULL DEFAULT true,
    tax_brackets JSONB NOT NULL DEFAULT '[]',
    basic_salary NUMERIC(14, 2) NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (tenant_id, class_name)
);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS town_settings CASCADE;
DROP TABLE IF EXISTS class_members CASCADE;
DROP TABLE IF EXISTS game_sessions CASCADE;
DROP TABLE IF EXISTS loan_payments CASCADE;
DROP TABLE IF EXISTS loans CASCADE;
DROP TABLE IF EXISTS tax_transactions CASCADE;
DROP TABLE IF EXISTS treasury_transactions CASCADE;
DROP TABLE IF EXISTS transactions CASCADE;
DROP TABLE IF EXISTS payroll_runs CASCADE;
DROP TABLE IF EXISTS treasuries CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;

DROP TYPE IF EXISTS payroll_kind;
DROP TYPE IF EXISTS difficulty;
DROP TYPE IF EXISTS session_status;
DROP TYPE IF EXISTS payment_source;
DROP TYPE IF EXISTS loan_status;
DROP TYPE IF EXISTS treasury_flow;
DROP TYPE IF EXISTS transaction_kind;
";

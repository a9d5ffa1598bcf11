//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtSettings,
    /// Economy defaults (tax, loans, games).
    #[serde(default)]
    pub economy: EconomyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval between scheduled loan settlement runs, in seconds.
    #[serde(default = "default_settlement_interval")]
    pub settlement_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_settlement_interval() -> u64 {
    3600
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Maximum time a unit waits for a row lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// JWT configuration as read from config sources.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for verifying tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// One progressive tax bracket: income above `from` is taxed at `rate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaxBracketConfig {
    /// Lower bound of the bracket (inclusive).
    pub from: Decimal,
    /// Marginal rate applied to income inside the bracket, e.g. `0.10`.
    pub rate: Decimal,
}

/// Interest tier: loans up to `max_weeks` are charged `rate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterestTierConfig {
    /// Longest term (in weeks) covered by this tier.
    pub max_weeks: u32,
    /// Flat interest rate over the life of the loan.
    pub rate: Decimal,
}

/// Loan policy defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct LoanConfig {
    /// Interest tiers ordered by `max_weeks`; the last tier bounds the term.
    #[serde(default = "default_interest_tiers")]
    pub interest_tiers: Vec<InterestTierConfig>,
    /// Maximum share of weekly salary a repayment may take.
    #[serde(default = "default_max_payment_ratio")]
    pub max_payment_ratio: Decimal,
    /// Minimum gap between two manual payments on one loan, in seconds.
    #[serde(default = "default_payment_cooldown")]
    pub payment_cooldown_secs: u64,
}

fn default_interest_tiers() -> Vec<InterestTierConfig> {
    vec![
        InterestTierConfig {
            max_weeks: 4,
            rate: Decimal::new(5, 2),
        },
        InterestTierConfig {
            max_weeks: 8,
            rate: Decimal::new(8, 2),
        },
        InterestTierConfig {
            max_weeks: 12,
            rate: Decimal::new(10, 2),
        },
    ]
}

fn default_max_payment_ratio() -> Decimal {
    Decimal::new(5, 1)
}

fn default_payment_cooldown() -> u64 {
    30
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            interest_tiers: default_interest_tiers(),
            max_payment_ratio: default_max_payment_ratio(),
            payment_cooldown_secs: default_payment_cooldown(),
        }
    }
}

/// Anti-fraud limits for game earnings.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Absolute minimum session length, in seconds.
    #[serde(default = "default_min_session_secs")]
    pub min_session_secs: u64,
    /// Minimum time per problem, in seconds.
    #[serde(default = "default_min_secs_per_problem")]
    pub min_secs_per_problem: u64,
    /// Reward per correct answer before multipliers.
    #[serde(default = "default_base_reward")]
    pub base_reward: Decimal,
    /// Earnings ceiling for one session.
    #[serde(default = "default_max_session_earnings")]
    pub max_session_earnings: Decimal,
    /// Trailing window for burst detection, in seconds.
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,
    /// Plays allowed inside the burst window.
    #[serde(default = "default_burst_max_sessions")]
    pub burst_max_sessions: u32,
    /// Plays allowed per day.
    #[serde(default = "default_daily_play_limit")]
    pub daily_play_limit: u32,
    /// Local hour (0-23) at which the daily counter resets.
    #[serde(default)]
    pub daily_reset_hour: u32,
    /// IANA time zone of the daily reset boundary.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_min_session_secs() -> u64 {
    20
}

fn default_min_secs_per_problem() -> u64 {
    2
}

fn default_base_reward() -> Decimal {
    Decimal::new(5, 0)
}

fn default_max_session_earnings() -> Decimal {
    Decimal::new(200, 0)
}

fn default_burst_window_secs() -> u64 {
    300
}

fn default_burst_max_sessions() -> u32 {
    3
}

fn default_daily_play_limit() -> u32 {
    10
}

fn default_timezone() -> String {
    "Africa/Johannesburg".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_session_secs: default_min_session_secs(),
            min_secs_per_problem: default_min_secs_per_problem(),
            base_reward: default_base_reward(),
            max_session_earnings: default_max_session_earnings(),
            burst_window_secs: default_burst_window_secs(),
            burst_max_sessions: default_burst_max_sessions(),
            daily_play_limit: default_daily_play_limit(),
            daily_reset_hour: 0,
            timezone: default_timezone(),
        }
    }
}

/// Economy defaults applied to every town unless overridden per class.
#[derive(Debug, Clone, Deserialize)]
pub struct EconomyConfig {
    /// Whether salaries are taxed.
    #[serde(default = "default_taxation_enabled")]
    pub taxation_enabled: bool,
    /// Progressive tax brackets ordered by `from`.
    #[serde(default = "default_tax_brackets")]
    pub tax_brackets: Vec<TaxBracketConfig>,
    /// Flat weekly payment to students without a job; zero disables it.
    #[serde(default = "default_basic_salary")]
    pub basic_salary: Decimal,
    /// Loan policy.
    #[serde(default)]
    pub loan: LoanConfig,
    /// Game earnings limits.
    #[serde(default)]
    pub games: GameConfig,
}

fn default_taxation_enabled() -> bool {
    true
}

fn default_tax_brackets() -> Vec<TaxBracketConfig> {
    vec![
        TaxBracketConfig {
            from: Decimal::ZERO,
            rate: Decimal::ZERO,
        },
        TaxBracketConfig {
            from: Decimal::new(1000, 0),
            rate: Decimal::new(10, 2),
        },
        TaxBracketConfig {
            from: Decimal::new(3000, 0),
            rate: Decimal::new(20, 2),
        },
        TaxBracketConfig {
            from: Decimal::new(6000, 0),
            rate: Decimal::new(30, 2),
        },
    ]
}

fn default_basic_salary() -> Decimal {
    Decimal::new(150, 0)
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            taxation_enabled: default_taxation_enabled(),
            tax_brackets: default_tax_brackets(),
            basic_salary: default_basic_salary(),
            loan: LoanConfig::default(),
            games: GameConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("CLASSBANK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

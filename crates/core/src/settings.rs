//! Per-town economy settings, queried at call time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use chrono_tz::Tz;
use classbank_shared::EconomyConfig;
use classbank_shared::config::{GameConfig, LoanConfig, TaxBracketConfig};
use classbank_shared::types::TenantId;
use rust_decimal::Decimal;

use crate::store::StoreError;

/// Marginal tax bracket: income above `from` is taxed at `rate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxBracket {
    /// Lower bound (inclusive).
    pub from: Decimal,
    /// Marginal rate.
    pub rate: Decimal,
}

impl From<&TaxBracketConfig> for TaxBracket {
    fn from(config: &TaxBracketConfig) -> Self {
        Self {
            from: config.from,
            rate: config.rate,
        }
    }
}

/// Settings of one town (class).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownSettings {
    /// Whether salaries are taxed.
    pub taxation_enabled: bool,
    /// Brackets sorted by `from`.
    pub tax_brackets: Vec<TaxBracket>,
    /// Flat basic salary; zero disables it.
    pub basic_salary: Decimal,
}

impl TownSettings {
    /// Builds town settings from configuration, sorting the brackets.
    #[must_use]
    pub fn from_config(config: &EconomyConfig) -> Self {
        let mut tax_brackets: Vec<TaxBracket> =
            config.tax_brackets.iter().map(TaxBracket::from).collect();
        tax_brackets.sort_by_key(|bracket| bracket.from);
        Self {
            taxation_enabled: config.taxation_enabled,
            tax_brackets,
            basic_salary: config.basic_salary,
        }
    }
}

/// Interest tier of the loan policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestTier {
    /// Longest term covered.
    pub max_weeks: u32,
    /// Flat rate.
    pub rate: Decimal,
}

/// Loan rules of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanPolicy {
    /// Tiers sorted by `max_weeks`.
    pub interest_tiers: Vec<InterestTier>,
    /// Share of weekly gross salary an installment may take.
    pub max_payment_ratio: Decimal,
    /// Minimum gap between manual payments on one loan.
    pub payment_cooldown: Duration,
}

impl LoanPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &LoanConfig) -> Self {
        let mut interest_tiers: Vec<InterestTier> = config
            .interest_tiers
            .iter()
            .map(|tier| InterestTier {
                max_weeks: tier.max_weeks,
                rate: tier.rate,
            })
            .collect();
        interest_tiers.sort_by_key(|tier| tier.max_weeks);
        Self {
            interest_tiers,
            max_payment_ratio: config.max_payment_ratio,
            payment_cooldown: secs(config.payment_cooldown_secs),
        }
    }

    /// Longest term any tier covers.
    #[must_use]
    pub fn max_term_weeks(&self) -> u32 {
        self.interest_tiers
            .iter()
            .map(|tier| tier.max_weeks)
            .max()
            .unwrap_or(0)
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self::from_config(&LoanConfig::default())
    }
}

/// Anti-fraud limits of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLimits {
    /// Absolute minimum session length.
    pub min_session: Duration,
    /// Minimum time per problem.
    pub min_per_problem: Duration,
    /// Reward per correct answer.
    pub base_reward: Decimal,
    /// Ceiling per session.
    pub max_session_earnings: Decimal,
    /// Trailing burst window.
    pub burst_window: Duration,
    /// Plays allowed inside the burst window.
    pub burst_max_sessions: u32,
    /// Plays allowed per day.
    pub daily_play_limit: u32,
    /// Local hour of the daily reset.
    pub daily_reset_hour: u32,
    /// Zone of the daily reset.
    pub timezone: Tz,
}

impl GameLimits {
    /// Builds the limits from configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidSettings` for an unknown time zone or a
    /// reset hour outside 0-23.
    pub fn from_config(config: &GameConfig) -> Result<Self, StoreError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| StoreError::InvalidSettings(format!("timezone: {e}")))?;
        if config.daily_reset_hour > 23 {
            return Err(StoreError::InvalidSettings(format!(
                "daily_reset_hour out of range: {}",
                config.daily_reset_hour
            )));
        }
        Ok(Self {
            min_session: secs(config.min_session_secs),
            min_per_problem: secs(config.min_secs_per_problem),
            base_reward: config.base_reward,
            max_session_earnings: config.max_session_earnings,
            burst_window: secs(config.burst_window_secs),
            burst_max_sessions: config.burst_max_sessions,
            daily_play_limit: config.daily_play_limit,
            daily_reset_hour: config.daily_reset_hour,
            timezone,
        })
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Source of settings, queried on every operation.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Settings of a class's town.
    async fn town_settings(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<TownSettings, StoreError>;

    /// Loan rules of a tenant.
    async fn loan_policy(&self, tenant: TenantId) -> Result<LoanPolicy, StoreError>;

    /// Game limits of a tenant.
    async fn game_limits(&self, tenant: TenantId) -> Result<GameLimits, StoreError>;
}

/// Same settings for every tenant, taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    town: TownSettings,
    loan: LoanPolicy,
    games: GameLimits,
}

impl StaticSettings {
    /// Creates the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidSettings` if the game limits are invalid.
    pub fn from_config(config: &EconomyConfig) -> Result<Self, StoreError> {
        Ok(Self {
            town: TownSettings::from_config(config),
            loan: LoanPolicy::from_config(&config.loan),
            games: GameLimits::from_config(&config.games)?,
        })
    }

    /// Replaces the town settings.
    #[must_use]
    pub fn with_town(mut self, town: TownSettings) -> Self {
        self.town = town;
        self
    }

    /// Replaces the game limits.
    #[must_use]
    pub fn with_games(mut self, games: GameLimits) -> Self {
        self.games = games;
        self
    }

    /// Wraps the provider for injection.
    #[must_use]
    pub fn shared(self) -> Arc<dyn SettingsProvider> {
        Arc::new(self)
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn town_settings(
        &self,
        _tenant: TenantId,
        _class_name: &str,
    ) -> Result<TownSettings, StoreError> {
        Ok(self.town.clone())
    }

    async fn loan_policy(&self, _tenant: TenantId) -> Result<LoanPolicy, StoreError> {
        Ok(self.loan.clone())
    }

    async fn game_limits(&self, _tenant: TenantId) -> Result<GameLimits, StoreError> {
        Ok(self.games.clone())
    }
}

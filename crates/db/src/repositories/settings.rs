//! Town settings read from `town_settings`, cached with Moka.
//!
//! Classes without a row fall back to the configured defaults. Loan and game
//! rules are tenant-wide and come from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use classbank_core::settings::{
    GameLimits, LoanPolicy, SettingsProvider, StaticSettings, TownSettings,
};
use classbank_core::store::StoreError;
use classbank_shared::types::TenantId;
use moka::future::Cache;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use tracing::debug;

use super::convert::{brackets_json, offset, store_err};
use crate::entities::town_settings;

/// Default cache capacity (number of classes).
const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

/// Default time-to-live for cached town settings.
const DEFAULT_TTL_SECS: u64 = 60;

/// Settings provider backed by Postgres.
#[derive(Clone)]
pub struct PgSettings {
    db: DatabaseConnection,
    defaults: Arc<dyn SettingsProvider>,
    towns: Cache<(TenantId, String), TownSettings>,
}

impl std::fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSettings")
            .field("cached_towns", &self.towns.entry_count())
            .finish_non_exhaustive()
    }
}

impl PgSettings {
    /// Creates the provider with the default cache settings.
    #[must_use]
    pub fn new(db: DatabaseConnection, defaults: StaticSettings) -> Self {
        Self::with_cache(db, defaults, DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates the provider with a custom cache size and TTL.
    #[must_use]
    pub fn with_cache(
        db: DatabaseConnection,
        defaults: StaticSettings,
        max_capacity: u64,
        ttl_secs: u64,
    ) -> Self {
        let towns = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self {
            db,
            defaults: defaults.shared(),
            towns,
        }
    }

    /// Stores the settings of a class and drops its cached copy.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the write fails.
    pub async fn save_town_settings(
        &self,
        tenant: TenantId,
        class_name: &str,
        settings: &TownSettings,
    ) -> Result<(), StoreError> {
        let row = town_settings::ActiveModel {
            tenant_id: Set(tenant.into_inner()),
            class_name: Set(class_name.to_string()),
            taxation_enabled: Set(settings.taxation_enabled),
            tax_brackets: Set(brackets_json(&settings.tax_brackets)?),
            basic_salary: Set(settings.basic_salary),
            updated_at: Set(offset(Utc::now())),
        };
        town_settings::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    town_settings::Column::TenantId,
                    town_settings::Column::ClassName,
                ])
                .update_columns([
                    town_settings::Column::TaxationEnabled,
                    town_settings::Column::TaxBrackets,
                    town_settings::Column::BasicSalary,
                    town_settings::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(store_err)?;

        self.towns
            .invalidate(&(tenant, class_name.to_string()))
            .await;
        Ok(())
    }

    async fn load_town(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<TownSettings, StoreError> {
        let row = town_settings::Entity::find_by_id((tenant.into_inner(), class_name.to_string()))
            .one(&self.db)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => TownSettings::try_from(row),
            None => {
                debug!(tenant_id = %tenant, class_name, "No town settings row, using defaults");
                self.defaults.town_settings(tenant, class_name).await
            }
        }
    }
}

#[async_trait]
impl SettingsProvider for PgSettings {
    async fn town_settings(
        &self,
        tenant: TenantId,
        class_name: &str,
    ) -> Result<TownSettings, StoreError> {
        let key = (tenant, class_name.to_string());
        if let Some(cached) = self.towns.get(&key).await {
            return Ok(cached);
        }
        let settings = self.load_town(tenant, class_name).await?;
        self.towns.insert(key, settings.clone()).await;
        Ok(settings)
    }

    async fn loan_policy(&self, tenant: TenantId) -> Result<LoanPolicy, StoreError> {
        self.defaults.loan_policy(tenant).await
    }

    async fn game_limits(&self, tenant: TenantId) -> Result<GameLimits, StoreError> {
        self.defaults.game_limits(tenant).await
    }
}

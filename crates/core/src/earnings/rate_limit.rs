//! Play-count limits: a trailing burst window and a daily ceiling that resets
//! at a fixed local hour.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use classbank_shared::types::{TenantId, UserId};

use super::error::EarningsError;
use crate::settings::GameLimits;
use crate::store::LedgerUnit;

/// Most recent daily reset at or before `now`.
///
/// A reset hour skipped by a daylight-saving jump resolves to the first valid
/// local time after it.
#[must_use]
pub fn daily_reset_boundary(now: DateTime<Utc>, reset_hour: u32, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let today = local.date_naive();
    let boundary = resolve(&tz, today.and_hms_opt(reset_hour, 0, 0));
    match boundary {
        Some(at) if at <= now => at,
        _ => resolve(&tz, (today - Duration::days(1)).and_hms_opt(reset_hour, 0, 0))
            .unwrap_or(now - Duration::days(1)),
    }
}

fn resolve(tz: &Tz, naive: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    let naive = naive?;
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(naive + Duration::hours(hours)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
}

/// Rejects the submission if the player has used up a limit.
///
/// Runs inside the submission unit after the player's account is locked, so
/// concurrent submissions by one player are counted one at a time.
///
/// # Errors
///
/// Returns `EarningsError::RateLimited` or `EarningsError::DailyLimitReached`.
pub async fn check_play_limits(
    unit: &mut dyn LedgerUnit,
    tenant: TenantId,
    user: UserId,
    limits: &GameLimits,
    now: DateTime<Utc>,
) -> Result<(), EarningsError> {
    let recent = unit
        .count_plays_since(tenant, user, now - limits.burst_window)
        .await?;
    if recent >= limits.burst_max_sessions {
        return Err(EarningsError::RateLimited {
            window_secs: limits.burst_window.num_seconds(),
        });
    }

    let since = daily_reset_boundary(now, limits.daily_reset_hour, limits.timezone);
    let today = unit.count_plays_since(tenant, user, since).await?;
    if today >= limits.daily_play_limit {
        return Err(EarningsError::DailyLimitReached {
            limit: limits.daily_play_limit,
        });
    }
    Ok(())
}

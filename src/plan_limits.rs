//! Per-tier budgets. A pure lookup, no I/O — the numeric knobs callers
//! tune live on [`crate::config::AppConfig`], not hardcoded here, so an
//! operator can adjust them without a rebuild.

use crate::config::AppConfig;
use crate::models::Tier;

#[derive(Debug, Clone)]
pub struct PlanLimits {
    pub max_profiles: i64,
    pub max_subreddits_per_profile: i64,
    pub max_leads_per_month: i64,
    pub max_posts_per_poll: i64,
    pub max_auto_suggestions: i64,
    /// UTC hours at which scheduled polling fires for this tier, read
    /// from `AppConfig::poll_times_starter`/`poll_times_premium`. Empty
    /// means "never scheduled" (Expired).
    pub poll_hours_utc: Vec<u32>,
}

/// Static budgets by tier. STARTER / FREE_TRIAL / legacy share the
/// starter schedule and the starter budget; GROWTH and PRO each get a
/// progressively larger one. `max_posts_per_poll` and
/// `max_auto_suggestions` have no equivalent in upstream billing config
/// (plan_limits carried `max_leads_per_month`/`polls_per_day` only) —
/// these two are sized here against the batch scorer's own default
/// concurrency and top-N defaults. Scheduled hours come from
/// `config.poll_times_starter`/`poll_times_premium`, not a hardcoded
/// table, so `POLL_TIMES_STARTER`/`POLL_TIMES_PREMIUM` actually govern
/// the schedule.
pub fn limits_for(tier: Tier, config: &AppConfig) -> PlanLimits {
    match tier {
        Tier::Starter | Tier::FreeTrial | Tier::Legacy => PlanLimits {
            max_profiles: 1,
            max_subreddits_per_profile: 15,
            max_leads_per_month: 3_000,
            max_posts_per_poll: 100,
            max_auto_suggestions: 5,
            poll_hours_utc: config.poll_times_starter.clone(),
        },
        Tier::Growth => PlanLimits {
            max_profiles: 3,
            max_subreddits_per_profile: 20,
            max_leads_per_month: 9_000,
            max_posts_per_poll: 300,
            max_auto_suggestions: 10,
            poll_hours_utc: config.poll_times_premium.clone(),
        },
        Tier::Pro => PlanLimits {
            max_profiles: 10,
            max_subreddits_per_profile: 999,
            max_leads_per_month: 30_000,
            max_posts_per_poll: 600,
            max_auto_suggestions: config.default_batch_size as i64,
            poll_hours_utc: config.poll_times_premium.clone(),
        },
        Tier::Expired => PlanLimits {
            max_profiles: 0,
            max_subreddits_per_profile: 0,
            max_leads_per_month: 0,
            max_posts_per_poll: 0,
            max_auto_suggestions: 0,
            poll_hours_utc: Vec::new(),
        },
    }
}

pub fn should_poll_now(tier: Tier, current_hour_utc: u32, config: &AppConfig) -> bool {
    limits_for(tier, config).poll_hours_utc.contains(&current_hour_utc)
}

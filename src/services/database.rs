use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Campaign, CampaignSubreddit, FetchedPost, Lead, PollJob, PollJobStatus, SubredditPoll, User,
};

/// Abstracts persistence so [`crate::poll_engine::PollEngine`] and
/// [`crate::scheduler::Scheduler`] can be exercised against an in-memory
/// double in tests and a real sqlite pool in production.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;
    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>>;
    async fn update_campaign_last_poll_at(&self, campaign_id: i64, at: DateTime<Utc>) -> Result<()>;
    async fn update_campaign_status(
        &self,
        campaign_id: i64,
        status: crate::models::CampaignStatus,
    ) -> Result<()>;

    /// Count of the user's campaigns not in `DELETED`, the quantity
    /// `PlanLimits::max_profiles` gates against.
    async fn count_active_campaigns_for_user(&self, user_id: i64) -> Result<i64>;

    /// Persists a new campaign in `DISCOVERING` with the given search
    /// queries already derived.
    async fn create_campaign(
        &self,
        owner_user_id: i64,
        business_description: &str,
        search_queries: &[String],
        poll_interval_hours: i64,
    ) -> Result<Campaign>;

    /// Atomically replaces every subreddit row for this campaign
    /// (delete-then-insert in one transaction) and returns the new set.
    async fn replace_campaign_subreddits(
        &self,
        campaign_id: i64,
        names: &[String],
    ) -> Result<Vec<CampaignSubreddit>>;

    async fn active_subreddits_for_campaign(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<CampaignSubreddit>>;

    /// All `(user, campaign)` pairs eligible for scheduled polling: the
    /// campaign is active and the owning user is active, unblocked, and
    /// not on the Expired tier. Tier-hour matching and trial/subscription
    /// expiry are the scheduler's job, not the query's.
    async fn pollable_campaigns(&self) -> Result<Vec<(User, Campaign)>>;

    async fn create_poll_job(
        &self,
        campaign_id: i64,
        trigger: crate::models::PollTrigger,
    ) -> Result<PollJob>;
    async fn update_poll_job(&self, job: &PollJob) -> Result<()>;

    /// Reddit post ids already recorded as leads for this campaign,
    /// across all poll jobs. Seeds the fetch-phase dedup set.
    async fn existing_reddit_post_ids(&self, campaign_id: i64) -> Result<std::collections::HashSet<String>>;

    async fn insert_unscored_leads(
        &self,
        campaign_id: i64,
        poll_job_id: i64,
        posts: &[FetchedPost],
    ) -> Result<Vec<Lead>>;

    async fn leads_for_poll_job(&self, poll_job_id: i64) -> Result<Vec<Lead>>;
    async fn update_lead_score(
        &self,
        lead_id: i64,
        score: Option<i64>,
        reason: &str,
    ) -> Result<()>;
    async fn update_lead_suggestions(
        &self,
        lead_id: i64,
        comment: &str,
        dm: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn delete_leads(&self, lead_ids: &[i64]) -> Result<u64>;

    async fn upsert_subreddit_poll(&self, poll: &SubredditPoll) -> Result<()>;

    async fn record_usage(
        &self,
        user_id: i64,
        api_kind: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()>;
}

/// Shared helper: both the sqlite and mock implementations build the
/// same `PollJob` shape for a freshly created job.
pub fn new_poll_job(id: i64, campaign_id: i64, trigger: crate::models::PollTrigger) -> PollJob {
    PollJob {
        id,
        campaign_id,
        status: PollJobStatus::Running,
        trigger,
        subreddits_polled: 0,
        posts_fetched: 0,
        posts_scored: 0,
        leads_created: 0,
        leads_deleted: 0,
        suggestions_generated: 0,
        error_message: None,
        started_at: Utc::now(),
        completed_at: None,
    }
}

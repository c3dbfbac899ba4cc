//! Ticks once an hour: finds every pollable (user, campaign) pair whose
//! tier is scheduled for the given UTC hour and runs the poll engine
//! against each, counting but never propagating per-campaign failures.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::PollTrigger;
use crate::plan_limits;
use crate::poll_engine::PollEngine;
use crate::services::DatabaseService;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub hour: u32,
    pub users_checked: u32,
    pub campaigns_polled: u32,
    pub campaigns_skipped: u32,
    pub errors: u32,
}

pub struct Scheduler {
    db: Arc<dyn DatabaseService>,
    engine: Arc<PollEngine>,
    config: AppConfig,
}

impl Scheduler {
    pub fn new(db: Arc<dyn DatabaseService>, engine: Arc<PollEngine>, config: AppConfig) -> Self {
        Self { db, engine, config }
    }

    /// `current_hour_utc` is always passed explicitly (never read from
    /// the clock here) so tests can drive every tier's schedule
    /// deterministically; the caller reads the wall clock.
    pub async fn tick(&self, current_hour_utc: u32) -> anyhow::Result<SchedulerStats> {
        let mut stats = SchedulerStats {
            hour: current_hour_utc,
            ..Default::default()
        };

        if !self.config.enable_scheduled_polling {
            return Ok(stats);
        }

        let pairs = self.db.pollable_campaigns().await?;
        let mut seen_users = std::collections::HashSet::new();

        for (user, campaign) in pairs {
            if seen_users.insert(user.id) {
                stats.users_checked += 1;
            }

            if !user.is_pollable(chrono::Utc::now()) {
                stats.campaigns_skipped += 1;
                continue;
            }

            if !plan_limits::should_poll_now(user.tier, current_hour_utc, &self.config) {
                continue;
            }

            match self.engine.run_poll(campaign.id, PollTrigger::Scheduled).await {
                Ok(_) => stats.campaigns_polled += 1,
                Err(e) => {
                    tracing::error!(campaign_id = campaign.id, error = %e, "scheduled poll failed");
                    stats.errors += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_scoring::BatchScoringService;
    use crate::models::{Campaign, CampaignStatus, FetchedPost, SubredditCandidate, Tier, User};
    use crate::poll_engine::EmailSink;
    use crate::reddit_source::RedditSource;
    use crate::services::mock_database::MockDatabaseService;

    struct EchoLlm;
    #[async_trait::async_trait]
    impl crate::llm::LlmClient for EchoLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(r#"{"scores": []}"#.to_string())
        }
    }

    struct EmptyRedditSource;
    #[async_trait::async_trait]
    impl RedditSource for EmptyRedditSource {
        async fn search_communities(
            &self,
            _query: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<SubredditCandidate>> {
            Ok(Vec::new())
        }
        async fn scrape_subreddit(&self, _subreddit: &str, _limit: usize) -> anyhow::Result<Vec<FetchedPost>> {
            Ok(Vec::new())
        }
    }

    struct NoopEmail;
    impl EmailSink for NoopEmail {
        fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            reddit_user_agent: "test".into(),
            reddit_api_provider: crate::config::RedditApiProvider::Scraper,
            llm_provider: crate::config::LlmProvider::Gemini,
            apify_token: String::new(),
            apify_reddit_actor_id: String::new(),
            rapidapi_key: String::new(),
            rapidapi_reddit_host: String::new(),
            reddit_rate_limit_per_minute: 20,
            gemini_api_key: String::new(),
            openai_api_key: String::new(),
            enable_scheduled_polling: true,
            poll_times_starter: vec![7, 16],
            poll_times_premium: vec![7, 11, 16, 22],
            default_batch_size: 20,
            max_concurrent: 5,
            min_relevancy_score: 50,
            auto_suggestion_threshold: 90,
        }
    }

    fn make_engine(db: Arc<dyn DatabaseService>) -> Arc<PollEngine> {
        Arc::new(PollEngine::new(
            db,
            Arc::new(EmptyRedditSource),
            Arc::new(BatchScoringService::new(Arc::new(EchoLlm), 20, 5)),
            Arc::new(NoopEmail),
            test_config(),
        ))
    }

    #[tokio::test]
    async fn starter_tier_only_polls_at_its_two_scheduled_hours() {
        let db = Arc::new(MockDatabaseService::new().with_campaign(
            User {
                id: 1,
                email: "a@b.com".into(),
                tier: Tier::Starter,
                is_active: true,
                is_blocked: false,
                trial_ends_at: None,
                subscription_ends_at: None,
            },
            Campaign {
                id: 1,
                owner_user_id: 1,
                status: CampaignStatus::Active,
                business_description: "b2b".into(),
                search_queries: vec![],
                poll_interval_hours: 6,
                last_poll_at: None,
                custom_comment_prompt: None,
                custom_dm_prompt: None,
            },
            vec![],
        ));
        let engine = make_engine(db.clone());
        let scheduler = Scheduler::new(db, engine, test_config());

        let off_hour = scheduler.tick(12).await.unwrap();
        assert_eq!(off_hour.campaigns_polled, 0);

        let on_hour = scheduler.tick(7).await.unwrap();
        assert_eq!(on_hour.campaigns_polled, 1);
    }

    #[tokio::test]
    async fn expired_user_is_skipped_and_never_queried_by_pollable_campaigns() {
        let db = Arc::new(MockDatabaseService::new().with_campaign(
            User {
                id: 1,
                email: "a@b.com".into(),
                tier: Tier::Expired,
                is_active: true,
                is_blocked: false,
                trial_ends_at: None,
                subscription_ends_at: None,
            },
            Campaign {
                id: 1,
                owner_user_id: 1,
                status: CampaignStatus::Active,
                business_description: "b2b".into(),
                search_queries: vec![],
                poll_interval_hours: 6,
                last_poll_at: None,
                custom_comment_prompt: None,
                custom_dm_prompt: None,
            },
            vec![],
        ));
        let engine = make_engine(db.clone());
        let scheduler = Scheduler::new(db, engine, test_config());

        let stats = scheduler.tick(7).await.unwrap();
        assert_eq!(stats.campaigns_polled, 0);
        assert_eq!(stats.users_checked, 0);
    }
}

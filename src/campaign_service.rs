//! Campaign CRUD plus the one LLM-assisted step (deriving search
//! queries from a business description) with a deterministic fallback
//! when the LLM's answer can't be parsed as JSON.

use anyhow::Result;

use crate::config::AppConfig;
use crate::error::CampaignServiceError;
use crate::llm::{extract_json, LlmClient};
use crate::models::{Campaign, CampaignStatus, Tier};
use crate::plan_limits;
use crate::services::DatabaseService;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "your", "you", "are", "our", "from", "have",
];

pub struct CampaignService<'a> {
    db: &'a dyn DatabaseService,
    llm: &'a dyn LlmClient,
    config: &'a AppConfig,
}

impl<'a> CampaignService<'a> {
    pub fn new(db: &'a dyn DatabaseService, llm: &'a dyn LlmClient, config: &'a AppConfig) -> Self {
        Self { db, llm, config }
    }

    fn assert_owner(&self, campaign: &Campaign, user_id: i64) -> Result<(), CampaignServiceError> {
        if campaign.owner_user_id != user_id {
            return Err(CampaignServiceError::NotAuthorized {
                user_id,
                campaign_id: campaign.id,
            });
        }
        Ok(())
    }

    /// Creates a campaign in `DISCOVERING`, rejecting the request if the
    /// user is already at `maxProfiles` for their tier.
    pub async fn create(
        &self,
        user_id: i64,
        business_description: &str,
        poll_interval_hours: i64,
    ) -> Result<Campaign> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;
        let limits = plan_limits::limits_for(user.tier, self.config);

        let profile_count = self.db.count_active_campaigns_for_user(user_id).await?;
        if profile_count >= limits.max_profiles {
            return Err(CampaignServiceError::PlanLimitExceeded(plan_limit_message(
                "active campaign",
                limits.max_profiles,
                user.tier,
            ))
            .into());
        }

        let queries = self.derive_search_queries(business_description).await;
        let campaign = self
            .db
            .create_campaign(user_id, business_description, &queries, poll_interval_hours)
            .await?;
        Ok(campaign)
    }

    /// Commits a subreddit selection, rejecting it if it exceeds
    /// `maxSubredditsPerProfile`, then transitions the campaign to
    /// `ACTIVE`.
    pub async fn select_subreddits(
        &self,
        user_id: i64,
        campaign_id: i64,
        selection: Vec<String>,
    ) -> Result<Campaign> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("campaign {campaign_id} not found"))?;
        self.assert_owner(&campaign, user_id)?;

        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;
        let limits = plan_limits::limits_for(user.tier, self.config);

        if selection.len() as i64 > limits.max_subreddits_per_profile {
            return Err(CampaignServiceError::PlanLimitExceeded(plan_limit_message(
                "subreddit",
                limits.max_subreddits_per_profile,
                user.tier,
            ))
            .into());
        }

        self.db.replace_campaign_subreddits(campaign_id, &selection).await?;
        self.db
            .update_campaign_status(campaign_id, CampaignStatus::Active)
            .await?;

        Ok(Campaign {
            status: CampaignStatus::Active,
            ..campaign
        })
    }

    /// Derives 4-6 short search phrases from a business description via
    /// the LLM, falling back to a keyword extractor if the response
    /// isn't parseable JSON.
    pub async fn derive_search_queries(&self, business_description: &str) -> Vec<String> {
        let prompt = format!(
            "Business: {business_description}\n\
             List 4-6 short search phrases (2-4 words each) Reddit users might post when \
             they need this. Respond as a JSON array of strings."
        );

        match self.llm.complete(&prompt).await {
            Ok(response) => match extract_json(&response) {
                Ok(serde_json::Value::Array(items)) => {
                    let queries: Vec<String> = items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                    if !queries.is_empty() {
                        return queries;
                    }
                    keyword_fallback(business_description)
                }
                _ => keyword_fallback(business_description),
            },
            Err(e) => {
                tracing::warn!(error = %e, "search query derivation failed, using keyword fallback");
                keyword_fallback(business_description)
            }
        }
    }

    pub async fn pause(&self, user_id: i64, campaign_id: i64) -> Result<()> {
        self.set_status(user_id, campaign_id, CampaignStatus::Paused).await
    }

    pub async fn resume(&self, user_id: i64, campaign_id: i64) -> Result<()> {
        self.set_status(user_id, campaign_id, CampaignStatus::Active).await
    }

    pub async fn delete(&self, user_id: i64, campaign_id: i64) -> Result<()> {
        self.set_status(user_id, campaign_id, CampaignStatus::Deleted).await
    }

    async fn set_status(&self, user_id: i64, campaign_id: i64, status: CampaignStatus) -> Result<()> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("campaign {campaign_id} not found"))?;
        self.assert_owner(&campaign, user_id)?;
        self.db.update_campaign_status(campaign_id, status).await?;
        Ok(())
    }
}

/// The next tier up, named in plan-limit rejection messages so the
/// caller knows what to offer the user.
fn upgrade_target(tier: Tier) -> Option<&'static str> {
    match tier {
        Tier::Starter | Tier::FreeTrial | Tier::Legacy => Some("GROWTH"),
        Tier::Growth => Some("PRO"),
        Tier::Pro | Tier::Expired => None,
    }
}

fn plan_limit_message(unit: &str, limit: i64, tier: Tier) -> String {
    match upgrade_target(tier) {
        Some(target) => format!("limit is {limit} {unit}(s) on your current plan; upgrade to {target} for more"),
        None => format!("limit is {limit} {unit}(s) on your current plan"),
    }
}

/// Splits on whitespace, strips punctuation, drops stop words and short
/// tokens. Used only when the LLM's JSON can't be parsed.
fn keyword_fallback(business_description: &str) -> Vec<String> {
    business_description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .take(6)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::services::mock_database::MockDatabaseService;

    #[test]
    fn keyword_fallback_drops_stop_words_and_short_tokens() {
        let out = keyword_fallback("We help your team with the CI and CD pipeline setup");
        assert!(!out.contains(&"the".to_string()));
        assert!(!out.contains(&"we".to_string()));
        assert!(out.contains(&"pipeline".to_string()));
    }

    struct EchoLlm;
    #[async_trait::async_trait]
    impl LlmClient for EchoLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(r#"["phrase one", "phrase two"]"#.to_string())
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

    fn starter_user() -> User {
        User {
            id: 1,
            email: "a@b.com".into(),
            tier: Tier::Starter,
            is_active: true,
            is_blocked: false,
            trial_ends_at: None,
            subscription_ends_at: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_a_second_campaign_on_starter_naming_the_limit_and_upgrade_target() {
        let db = MockDatabaseService::new().with_campaign(
            starter_user(),
            Campaign {
                id: 1,
                owner_user_id: 1,
                status: CampaignStatus::Active,
                business_description: "b2b saas".into(),
                search_queries: vec![],
                poll_interval_hours: 6,
                last_poll_at: None,
                custom_comment_prompt: None,
                custom_dm_prompt: None,
            },
            vec![],
        );
        let llm = EchoLlm;
        let config = test_config();
        let service = CampaignService::new(&db, &llm, &config);

        let err = service
            .create(1, "another business", 6)
            .await
            .expect_err("starter is already at its profile limit");
        let msg = err.to_string();
        assert!(msg.contains('1'), "message should name the limit: {msg}");
        assert!(msg.contains("GROWTH"), "message should name the upgrade target: {msg}");
    }

    #[tokio::test]
    async fn select_subreddits_rejects_a_selection_over_the_tier_limit() {
        let db = MockDatabaseService::new().with_campaign(
            starter_user(),
            Campaign {
                id: 1,
                owner_user_id: 1,
                status: CampaignStatus::Discovering,
                business_description: "b2b saas".into(),
                search_queries: vec![],
                poll_interval_hours: 6,
                last_poll_at: None,
                custom_comment_prompt: None,
                custom_dm_prompt: None,
            },
            vec![],
        );
        let llm = EchoLlm;
        let config = test_config();
        let service = CampaignService::new(&db, &llm, &config);

        let too_many: Vec<String> = (0..20).map(|i| format!("sub{i}")).collect();
        assert!(service.select_subreddits(1, 1, too_many).await.is_err());

        let ok = vec!["rust".to_string(), "programming".to_string()];
        let campaign = service.select_subreddits(1, 1, ok).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Active);
    }
}

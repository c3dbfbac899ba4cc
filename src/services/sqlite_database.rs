use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::models::{
    Campaign, CampaignStatus, CampaignSubreddit, FetchedPost, Lead, LeadStatus, PollJob,
    PollJobStatus, PollTrigger, SubredditPoll, Tier, User,
};
use crate::services::database::DatabaseService;

pub struct SqliteDatabaseService {
    pool: SqlitePool,
}

impl SqliteDatabaseService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl DatabaseService for SqliteDatabaseService {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query!(
            r#"SELECT id, email, tier, is_active, is_blocked, trial_ends_at, subscription_ends_at
               FROM users WHERE id = ?"#,
            user_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            email: r.email,
            tier: Tier::from_str(&r.tier),
            is_active: r.is_active != 0,
            is_blocked: r.is_blocked != 0,
            trial_ends_at: parse_dt(r.trial_ends_at),
            subscription_ends_at: parse_dt(r.subscription_ends_at),
        }))
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query!(
            r#"SELECT id, owner_user_id, status, business_description, search_queries_json,
                      poll_interval_hours, last_poll_at, custom_comment_prompt, custom_dm_prompt
               FROM campaigns WHERE id = ?"#,
            campaign_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Campaign {
            id: r.id,
            owner_user_id: r.owner_user_id,
            status: CampaignStatus::from_str(&r.status),
            business_description: r.business_description,
            search_queries: serde_json::from_str(&r.search_queries_json).unwrap_or_default(),
            poll_interval_hours: r.poll_interval_hours,
            last_poll_at: parse_dt(r.last_poll_at),
            custom_comment_prompt: r.custom_comment_prompt,
            custom_dm_prompt: r.custom_dm_prompt,
        }))
    }

    async fn update_campaign_last_poll_at(&self, campaign_id: i64, at: DateTime<Utc>) -> Result<()> {
        let at = at.to_rfc3339();
        sqlx::query!(
            "UPDATE campaigns SET last_poll_at = ? WHERE id = ?",
            at,
            campaign_id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: i64,
        status: CampaignStatus,
    ) -> Result<()> {
        let status = status.as_str();
        sqlx::query!(
            "UPDATE campaigns SET status = ? WHERE id = ?",
            status,
            campaign_id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_active_campaigns_for_user(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query!(
            "SELECT COUNT(*) as count FROM campaigns WHERE owner_user_id = ? AND status != 'deleted'",
            user_id
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.count)
    }

    async fn create_campaign(
        &self,
        owner_user_id: i64,
        business_description: &str,
        search_queries: &[String],
        poll_interval_hours: i64,
    ) -> Result<Campaign> {
        let status = CampaignStatus::Discovering.as_str();
        let search_queries_json = serde_json::to_string(search_queries)?;
        let id = sqlx::query!(
            r#"INSERT INTO campaigns (owner_user_id, status, business_description, search_queries_json, poll_interval_hours)
               VALUES (?, ?, ?, ?, ?)"#,
            owner_user_id,
            status,
            business_description,
            search_queries_json,
            poll_interval_hours
        )
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Campaign {
            id,
            owner_user_id,
            status: CampaignStatus::Discovering,
            business_description: business_description.to_string(),
            search_queries: search_queries.to_vec(),
            poll_interval_hours,
            last_poll_at: None,
            custom_comment_prompt: None,
            custom_dm_prompt: None,
        })
    }

    async fn replace_campaign_subreddits(
        &self,
        campaign_id: i64,
        names: &[String],
    ) -> Result<Vec<CampaignSubreddit>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!("DELETE FROM campaign_subreddits WHERE campaign_id = ?", campaign_id)
            .execute(&mut *tx)
            .await?;

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let id = sqlx::query!(
                "INSERT INTO campaign_subreddits (campaign_id, name, active) VALUES (?, ?, 1)",
                campaign_id,
                name
            )
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            out.push(CampaignSubreddit {
                id,
                campaign_id,
                name: name.clone(),
                title: None,
                description: None,
                subscribers: None,
                relevance_score: None,
                active: true,
            });
        }

        tx.commit().await?;
        Ok(out)
    }

    async fn active_subreddits_for_campaign(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<CampaignSubreddit>> {
        let rows = sqlx::query!(
            r#"SELECT id, campaign_id, name, title, description, subscribers, relevance_score, active
               FROM campaign_subreddits WHERE campaign_id = ? AND active = 1"#,
            campaign_id
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CampaignSubreddit {
                id: r.id,
                campaign_id: r.campaign_id,
                name: r.name,
                title: r.title,
                description: r.description,
                subscribers: r.subscribers,
                relevance_score: r.relevance_score,
                active: r.active != 0,
            })
            .collect())
    }

    async fn pollable_campaigns(&self) -> Result<Vec<(User, Campaign)>> {
        let rows = sqlx::query!(
            r#"SELECT
                 u.id as user_id, u.email, u.tier, u.is_active, u.is_blocked,
                 u.trial_ends_at, u.subscription_ends_at,
                 c.id as campaign_id, c.owner_user_id, c.status, c.business_description,
                 c.search_queries_json, c.poll_interval_hours, c.last_poll_at,
                 c.custom_comment_prompt, c.custom_dm_prompt
               FROM campaigns c
               JOIN users u ON u.id = c.owner_user_id
               WHERE c.status = 'active'
                 AND u.is_active = 1
                 AND u.is_blocked = 0
                 AND u.tier != 'expired'"#
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let user = User {
                    id: r.user_id,
                    email: r.email,
                    tier: Tier::from_str(&r.tier),
                    is_active: r.is_active != 0,
                    is_blocked: r.is_blocked != 0,
                    trial_ends_at: parse_dt(r.trial_ends_at),
                    subscription_ends_at: parse_dt(r.subscription_ends_at),
                };
                let campaign = Campaign {
                    id: r.campaign_id,
                    owner_user_id: r.owner_user_id,
                    status: CampaignStatus::from_str(&r.status),
                    business_description: r.business_description,
                    search_queries: serde_json::from_str(&r.search_queries_json)
                        .unwrap_or_default(),
                    poll_interval_hours: r.poll_interval_hours,
                    last_poll_at: parse_dt(r.last_poll_at),
                    custom_comment_prompt: r.custom_comment_prompt,
                    custom_dm_prompt: r.custom_dm_prompt,
                };
                (user, campaign)
            })
            .collect())
    }

    async fn create_poll_job(&self, campaign_id: i64, trigger: PollTrigger) -> Result<PollJob> {
        let status = PollJobStatus::Running.as_str();
        let trigger_str = trigger.as_str();
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query!(
            r#"INSERT INTO poll_jobs (campaign_id, status, trigger, started_at)
               VALUES (?, ?, ?, ?)"#,
            campaign_id,
            status,
            trigger_str,
            now
        )
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(crate::services::database::new_poll_job(id, campaign_id, trigger))
    }

    async fn update_poll_job(&self, job: &PollJob) -> Result<()> {
        let status = job.status.as_str();
        let completed_at = job.completed_at.map(|d| d.to_rfc3339());
        sqlx::query!(
            r#"UPDATE poll_jobs SET
                 status = ?, subreddits_polled = ?, posts_fetched = ?, posts_scored = ?,
                 leads_created = ?, leads_deleted = ?, suggestions_generated = ?,
                 error_message = ?, completed_at = ?
               WHERE id = ?"#,
            status,
            job.subreddits_polled,
            job.posts_fetched,
            job.posts_scored,
            job.leads_created,
            job.leads_deleted,
            job.suggestions_generated,
            job.error_message,
            completed_at,
            job.id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn existing_reddit_post_ids(&self, campaign_id: i64) -> Result<HashSet<String>> {
        let rows = sqlx::query!(
            "SELECT reddit_post_id FROM leads WHERE campaign_id = ?",
            campaign_id
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.reddit_post_id).collect())
    }

    async fn insert_unscored_leads(
        &self,
        campaign_id: i64,
        poll_job_id: i64,
        posts: &[FetchedPost],
    ) -> Result<Vec<Lead>> {
        let mut leads = Vec::with_capacity(posts.len());
        for post in posts {
            let created = post.created_at_utc.to_rfc3339();
            let status = LeadStatus::New.as_str();
            let reason = "Pending scoring";
            let id = match sqlx::query!(
                r#"INSERT INTO leads (
                     campaign_id, poll_job_id, reddit_post_id, subreddit_name, title, content,
                     author, post_url, reddit_score, num_comments, created_at_utc,
                     relevancy_reason, status
                   ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                campaign_id,
                poll_job_id,
                post.reddit_post_id,
                post.subreddit_name,
                post.title,
                post.content,
                post.author,
                post.post_url,
                post.score,
                post.num_comments,
                created,
                reason,
                status
            )
            .execute(&self.pool)
            .await
            {
                Ok(r) => r.last_insert_rowid(),
                // reddit_post_id unique per campaign: a concurrent poll
                // already recorded this post, skip it.
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => continue,
                Err(e) => return Err(e.into()),
            };

            leads.push(Lead {
                id,
                campaign_id,
                poll_job_id: Some(poll_job_id),
                reddit_post_id: post.reddit_post_id.clone(),
                subreddit_name: post.subreddit_name.clone(),
                title: post.title.clone(),
                content: post.content.clone(),
                author: post.author.clone(),
                post_url: post.post_url.clone(),
                reddit_score: post.score,
                num_comments: post.num_comments,
                created_at_utc: post.created_at_utc,
                relevancy_score: None,
                relevancy_reason: reason.to_string(),
                suggested_comment: String::new(),
                suggested_dm: String::new(),
                has_suggestions: false,
                suggestions_generated_at: None,
                status: LeadStatus::New,
                discovered_at: Utc::now(),
                updated_at: Utc::now(),
            });
        }
        Ok(leads)
    }

    async fn leads_for_poll_job(&self, poll_job_id: i64) -> Result<Vec<Lead>> {
        let rows = sqlx::query!(
            r#"SELECT id, campaign_id, poll_job_id, reddit_post_id, subreddit_name, title,
                      content, author, post_url, reddit_score, num_comments, created_at_utc,
                      relevancy_score, relevancy_reason, suggested_comment, suggested_dm,
                      has_suggestions, suggestions_generated_at, status, discovered_at, updated_at
               FROM leads WHERE poll_job_id = ?"#,
            poll_job_id
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Lead {
                id: r.id,
                campaign_id: r.campaign_id,
                poll_job_id: r.poll_job_id,
                reddit_post_id: r.reddit_post_id,
                subreddit_name: r.subreddit_name,
                title: r.title,
                content: r.content,
                author: r.author,
                post_url: r.post_url,
                reddit_score: r.reddit_score,
                num_comments: r.num_comments,
                created_at_utc: DateTime::parse_from_rfc3339(&r.created_at_utc)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                relevancy_score: r.relevancy_score,
                relevancy_reason: r.relevancy_reason,
                suggested_comment: r.suggested_comment,
                suggested_dm: r.suggested_dm,
                has_suggestions: r.has_suggestions != 0,
                suggestions_generated_at: parse_dt(r.suggestions_generated_at),
                status: LeadStatus::from_str(&r.status),
                discovered_at: parse_dt(Some(r.discovered_at)).unwrap_or_else(Utc::now),
                updated_at: parse_dt(Some(r.updated_at)).unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn update_lead_score(&self, lead_id: i64, score: Option<i64>, reason: &str) -> Result<()> {
        sqlx::query!(
            "UPDATE leads SET relevancy_score = ?, relevancy_reason = ?, updated_at = datetime('now') WHERE id = ?",
            score,
            reason,
            lead_id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_lead_suggestions(
        &self,
        lead_id: i64,
        comment: &str,
        dm: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<()> {
        let generated_at = generated_at.to_rfc3339();
        sqlx::query!(
            r#"UPDATE leads SET suggested_comment = ?, suggested_dm = ?, has_suggestions = 1,
                 suggestions_generated_at = ?, updated_at = datetime('now') WHERE id = ?"#,
            comment,
            dm,
            generated_at,
            lead_id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_leads(&self, lead_ids: &[i64]) -> Result<u64> {
        let mut deleted = 0u64;
        for id in lead_ids {
            let res = sqlx::query!("DELETE FROM leads WHERE id = ?", id)
                .execute(&self.pool)
                .await?;
            deleted += res.rows_affected();
        }
        Ok(deleted)
    }

    async fn upsert_subreddit_poll(&self, poll: &SubredditPoll) -> Result<()> {
        let last_poll_at = poll.last_poll_at.map(|d| d.to_rfc3339());
        let last_post_timestamp = poll.last_post_timestamp.map(|d| d.to_rfc3339());
        sqlx::query!(
            r#"INSERT INTO subreddit_polls (name, last_poll_at, last_post_timestamp, poll_count, total_posts_found)
               VALUES (?, ?, ?, 1, ?)
               ON CONFLICT(name) DO UPDATE SET
                 last_poll_at = excluded.last_poll_at,
                 last_post_timestamp = excluded.last_post_timestamp,
                 poll_count = subreddit_polls.poll_count + 1,
                 total_posts_found = subreddit_polls.total_posts_found + excluded.total_posts_found"#,
            poll.name,
            last_poll_at,
            last_post_timestamp,
            poll.total_posts_found
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_usage(
        &self,
        user_id: i64,
        api_kind: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()> {
        let today = Utc::now().date_naive();
        sqlx::query!(
            r#"INSERT INTO usage_records (user_id, api_kind, utc_day, call_count, input_tokens, output_tokens)
               VALUES (?, ?, ?, 1, ?, ?)
               ON CONFLICT(user_id, api_kind, utc_day) DO UPDATE SET
                 call_count = usage_records.call_count + 1,
                 input_tokens = usage_records.input_tokens + excluded.input_tokens,
                 output_tokens = usage_records.output_tokens + excluded.output_tokens"#,
            user_id,
            api_kind,
            today,
            input_tokens,
            output_tokens
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

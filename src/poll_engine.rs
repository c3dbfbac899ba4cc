//! The seven-phase poll pipeline: validate, create a job, fetch posts,
//! persist them unscored, batch-score, drop the low scorers, draft
//! suggestions for the best of what's left, finalize, and email a
//! summary. Each phase commits before the next begins.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::batch_scoring::{BatchScoringService, ScorableLead, SuggestableLead};
use crate::config::AppConfig;
use crate::error::PollEngineError;
use crate::models::{CampaignStatus, Lead, PollJob, PollJobStatus, PollTrigger};
use crate::plan_limits::{self, PlanLimits};
use crate::reddit_source::RedditSource;
use crate::services::DatabaseService;
use crate::usage::{ApiKind, UsageCounter};

const DEFAULT_POSTS_PER_SUBREDDIT: usize = 20;
const MIN_POSTS_PER_SUBREDDIT: usize = 5;

/// Hooks an embedding caller can use to observe a run in progress. All
/// methods default to no-ops so `run_poll` can call the callback form
/// unconditionally.
#[async_trait]
pub trait PollCallbacks: Send + Sync {
    async fn on_progress(&self, _phase: &str, _detail: &str) {}
    async fn on_lead_created(&self, _lead: &Lead) {}
    async fn on_complete(&self, _job: &PollJob) {}
    async fn on_error(&self, _message: &str) {}
}

pub struct NoopCallbacks;

#[async_trait]
impl PollCallbacks for NoopCallbacks {}

pub trait EmailSink: Send + Sync {
    fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<bool>;
}

pub struct PollEngine {
    db: Arc<dyn DatabaseService>,
    reddit: Arc<dyn RedditSource>,
    scoring: Arc<BatchScoringService>,
    email: Arc<dyn EmailSink>,
    config: AppConfig,
}

impl PollEngine {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        reddit: Arc<dyn RedditSource>,
        scoring: Arc<BatchScoringService>,
        email: Arc<dyn EmailSink>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            reddit,
            scoring,
            email,
            config,
        }
    }

    pub async fn run_poll(&self, campaign_id: i64, trigger: PollTrigger) -> Result<PollJob> {
        self.run_poll_with_callbacks(campaign_id, trigger, &NoopCallbacks).await
    }

    pub async fn run_poll_with_callbacks(
        &self,
        campaign_id: i64,
        trigger: PollTrigger,
        callbacks: &dyn PollCallbacks,
    ) -> Result<PollJob> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or(PollEngineError::CampaignNotFound(campaign_id))?;

        if campaign.status != CampaignStatus::Active {
            let msg = format!("campaign {campaign_id} is not active");
            callbacks.on_error(&msg).await;
            return Err(PollEngineError::CampaignNotActive(campaign_id).into());
        }

        let user = self
            .db
            .get_user(campaign.owner_user_id)
            .await?
            .ok_or(PollEngineError::UserNotPollable(campaign.owner_user_id))?;
        if !user.is_pollable(Utc::now()) {
            let msg = format!("user {} is not eligible for polling", user.id);
            callbacks.on_error(&msg).await;
            return Err(PollEngineError::UserNotPollable(user.id).into());
        }

        // No PollJob row exists yet: validation failures leave no trace.
        let mut job = self.db.create_poll_job(campaign_id, trigger).await?;

        let limits = plan_limits::limits_for(user.tier, &self.config);

        match self
            .run_phases(&mut job, &campaign, &user, &limits, callbacks)
            .await
        {
            Ok(()) => {
                self.db.update_poll_job(&job).await?;
                callbacks.on_complete(&job).await;
                Ok(job)
            }
            Err(e) => {
                job.status = PollJobStatus::Failed;
                job.error_message = Some(e.to_string());
                job.completed_at = Some(Utc::now());
                self.db.update_poll_job(&job).await?;
                callbacks.on_error(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        job: &mut PollJob,
        campaign: &crate::models::Campaign,
        user: &crate::models::User,
        limits: &PlanLimits,
        callbacks: &dyn PollCallbacks,
    ) -> Result<()> {
        // Phase 1: fetch.
        let posts = self.fetch_posts(job, campaign, user, limits, callbacks).await?;
        job.posts_fetched = posts.len() as i64;
        self.db.update_poll_job(job).await?;

        if posts.is_empty() {
            job.status = PollJobStatus::Completed;
            job.completed_at = Some(Utc::now());
            return Ok(());
        }

        // Phase 2: persist unscored.
        let leads = self
            .db
            .insert_unscored_leads(campaign.id, job.id, &posts)
            .await?;

        // Phase 3: batch score.
        self.batch_score(job, user, campaign, &leads).await?;
        self.db.update_poll_job(job).await?;

        // Phase 4: cleanup.
        let survivors = self.cleanup_low_score_leads(job).await?;
        self.db.update_poll_job(job).await?;

        for lead in &survivors {
            callbacks.on_lead_created(lead).await;
        }

        // Phase 5: suggestions.
        self.generate_suggestions(job, user, campaign, limits, &survivors)
            .await?;
        self.db.update_poll_job(job).await?;

        // Phase 6: finalize.
        job.status = PollJobStatus::Completed;
        job.completed_at = Some(Utc::now());
        self.db
            .update_campaign_last_poll_at(campaign.id, job.completed_at.unwrap())
            .await?;

        // Phase 7: email (best-effort, never fails the job).
        if let Err(e) = self.send_summary_email(job, user).await {
            tracing::warn!(error = %e, poll_job_id = job.id, "summary email failed");
        }

        Ok(())
    }

    async fn fetch_posts(
        &self,
        job: &mut PollJob,
        campaign: &crate::models::Campaign,
        user: &crate::models::User,
        limits: &PlanLimits,
        callbacks: &dyn PollCallbacks,
    ) -> Result<Vec<crate::models::FetchedPost>> {
        let subs = self.db.active_subreddits_for_campaign(campaign.id).await?;
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let posts_per_sub = if limits.max_posts_per_poll > 0 {
            (limits.max_posts_per_poll as usize / subs.len()).max(MIN_POSTS_PER_SUBREDDIT)
        } else {
            DEFAULT_POSTS_PER_SUBREDDIT
        };

        let mut existing_ids = self.db.existing_reddit_post_ids(campaign.id).await?;
        let mut all_posts = Vec::new();
        let api_kind = match self.config.reddit_api_provider {
            crate::config::RedditApiProvider::Scraper => ApiKind::RedditScraper,
            crate::config::RedditApiProvider::DirectApi => ApiKind::RedditDirectApi,
        };

        for sub in &subs {
            match self.reddit.scrape_subreddit(&sub.name, posts_per_sub).await {
                Ok(fetched) => {
                    let fresh: Vec<_> = fetched
                        .into_iter()
                        .filter(|p| !existing_ids.contains(&p.reddit_post_id))
                        .collect();
                    for p in &fresh {
                        existing_ids.insert(p.reddit_post_id.clone());
                    }
                    job.subreddits_polled += 1;
                    let _ = UsageCounter::record(self.db.as_ref(), user.id, api_kind, 0, 0).await;
                    callbacks
                        .on_progress("fetching", &format!("{}: {} new posts", sub.name, fresh.len()))
                        .await;

                    let _ = self
                        .db
                        .upsert_subreddit_poll(&crate::models::SubredditPoll {
                            name: sub.name.clone(),
                            last_poll_at: Some(Utc::now()),
                            last_post_timestamp: fresh.iter().map(|p| p.created_at_utc).max(),
                            poll_count: 1,
                            total_posts_found: fresh.len() as i64,
                        })
                        .await;

                    all_posts.extend(fresh);
                }
                Err(e) => {
                    tracing::warn!(subreddit = %sub.name, error = %e, "fetch failed for subreddit, continuing");
                    callbacks
                        .on_progress("fetching", &format!("{}: error: {e}", sub.name))
                        .await;
                }
            }
        }

        Ok(all_posts)
    }

    async fn batch_score(
        &self,
        job: &mut PollJob,
        user: &crate::models::User,
        campaign: &crate::models::Campaign,
        leads: &[Lead],
    ) -> Result<()> {
        let scorable: Vec<ScorableLead> = leads
            .iter()
            .map(|l| ScorableLead {
                lead_id: l.id,
                reddit_post_id: l.reddit_post_id.clone(),
                title: l.title.clone(),
                content: l.content.clone(),
                subreddit_name: l.subreddit_name.clone(),
            })
            .collect();

        let results = self
            .scoring
            .batch_quick_score(&scorable, &campaign.business_description)
            .await;

        for result in &results {
            self.db
                .update_lead_score(result.lead_id, Some(result.score), &result.reason)
                .await?;
        }
        job.posts_scored = results.len() as i64;

        let llm_kind = match self.config.llm_provider {
            crate::config::LlmProvider::Gemini => ApiKind::LlmGemini,
            crate::config::LlmProvider::OpenAi => ApiKind::LlmOpenAi,
        };
        for _ in 0..self.scoring.llm_calls_made() {
            let _ = UsageCounter::record(self.db.as_ref(), user.id, llm_kind, 0, 0).await;
        }

        Ok(())
    }

    /// Deletes every lead from this job scoring below
    /// `min_relevancy_score` (or left unscored), returning the leads
    /// that survived.
    async fn cleanup_low_score_leads(&self, job: &mut PollJob) -> Result<Vec<Lead>> {
        let leads = self.db.leads_for_poll_job(job.id).await?;
        let (survivors, to_delete): (Vec<_>, Vec<_>) = leads.into_iter().partition(|l| {
            l.relevancy_score
                .map_or(false, |s| s >= self.config.min_relevancy_score)
        });

        let deleted_ids: Vec<i64> = to_delete.iter().map(|l| l.id).collect();
        let deleted = self.db.delete_leads(&deleted_ids).await?;

        job.leads_created = survivors.len() as i64;
        job.leads_deleted = deleted as i64;
        Ok(survivors)
    }

    async fn generate_suggestions(
        &self,
        job: &mut PollJob,
        user: &crate::models::User,
        campaign: &crate::models::Campaign,
        limits: &PlanLimits,
        survivors: &[Lead],
    ) -> Result<()> {
        let suggestable: Vec<SuggestableLead> = survivors
            .iter()
            .filter_map(|l| {
                l.relevancy_score.map(|score| SuggestableLead {
                    lead_id: l.id,
                    title: l.title.clone(),
                    content: l.content.clone(),
                    score,
                })
            })
            .collect();

        let results = self
            .scoring
            .generate_suggestions_for_high_score(
                &suggestable,
                &campaign.business_description,
                self.config.auto_suggestion_threshold,
                limits.max_auto_suggestions.max(0) as usize,
            )
            .await;

        let llm_kind = match self.config.llm_provider {
            crate::config::LlmProvider::Gemini => ApiKind::LlmGemini,
            crate::config::LlmProvider::OpenAi => ApiKind::LlmOpenAi,
        };
        for _ in 0..self.scoring.suggestion_calls_made() {
            let _ = UsageCounter::record(self.db.as_ref(), user.id, llm_kind, 0, 0).await;
        }

        let now = Utc::now();
        for result in &results {
            self.db
                .update_lead_suggestions(result.lead_id, &result.comment, &result.dm, now)
                .await?;
        }
        job.suggestions_generated = results.len() as i64;
        Ok(())
    }

    async fn send_summary_email(&self, job: &PollJob, user: &crate::models::User) -> Result<()> {
        if job.leads_created == 0 {
            return Ok(());
        }
        let leads = self.db.leads_for_poll_job(job.id).await?;
        let mut scored: Vec<&Lead> = leads.iter().filter(|l| l.relevancy_score.is_some()).collect();
        scored.sort_by(|a, b| b.relevancy_score.cmp(&a.relevancy_score));
        scored.truncate(10);

        let (buckets, _) = summarize(&leads);

        let html = render_summary_email(job, &scored, &buckets);
        self.email.send(&user.email, "New leads found", &html)?;
        Ok(())
    }
}

fn render_summary_email(
    job: &PollJob,
    leads: &[&Lead],
    buckets: &HashMap<&'static str, usize>,
) -> String {
    let rows: String = leads
        .iter()
        .map(|l| {
            format!(
                "<li><a href=\"{}\">{}</a> (score {})</li>",
                l.post_url,
                l.title,
                l.relevancy_score.unwrap_or(0)
            )
        })
        .collect();
    let breakdown: String = ["90+", "80-89", "70-79", "60-69", "50-59"]
        .iter()
        .map(|bucket| format!("{bucket}: {}", buckets.get(bucket).copied().unwrap_or(0)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "<p>Poll job {} found {} leads ({breakdown}).</p><ul>{rows}</ul>",
        job.id, job.leads_created
    )
}

/// Relevancy-score and subreddit breakdowns for a finished job, the
/// shape a completion callback or dashboard would want.
pub fn summarize(leads: &[Lead]) -> (HashMap<&'static str, usize>, HashMap<String, usize>) {
    let mut buckets: HashMap<&'static str, usize> = HashMap::new();
    let mut by_subreddit: HashMap<String, usize> = HashMap::new();
    for lead in leads {
        if let Some(score) = lead.relevancy_score {
            let bucket = match score {
                90..=100 => "90+",
                80..=89 => "80-89",
                70..=79 => "70-79",
                60..=69 => "60-69",
                _ => "50-59",
            };
            *buckets.entry(bucket).or_insert(0) += 1;
        }
        *by_subreddit.entry(lead.subreddit_name.clone()).or_insert(0) += 1;
    }
    (buckets, by_subreddit)
}

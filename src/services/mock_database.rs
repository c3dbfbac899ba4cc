use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::models::{
    Campaign, CampaignSubreddit, FetchedPost, Lead, LeadStatus, PollJob, PollTrigger,
    SubredditPoll, User,
};
use crate::services::database::{new_poll_job, DatabaseService};

/// In-memory double for [`DatabaseService`], used by `poll_engine` and
/// `scheduler` unit tests. All state lives behind a single `Mutex` —
/// this is a test double, not a concurrency model to imitate.
#[derive(Default)]
pub struct MockDatabaseService {
    pub users: Mutex<Vec<User>>,
    pub campaigns: Mutex<Vec<Campaign>>,
    pub subreddits: Mutex<Vec<CampaignSubreddit>>,
    pub poll_jobs: Mutex<Vec<PollJob>>,
    pub leads: Mutex<Vec<Lead>>,
    pub subreddit_polls: Mutex<Vec<SubredditPoll>>,
    pub usage: Mutex<Vec<(i64, String, i64, i64)>>,
    next_poll_job_id: Mutex<i64>,
    next_lead_id: Mutex<i64>,
    next_campaign_id: Mutex<i64>,
    next_subreddit_id: Mutex<i64>,
}

impl MockDatabaseService {
    pub fn new() -> Self {
        Self {
            next_poll_job_id: Mutex::new(1),
            next_lead_id: Mutex::new(1),
            next_campaign_id: Mutex::new(1),
            next_subreddit_id: Mutex::new(1),
            ..Default::default()
        }
    }

    pub fn with_campaign(self, user: User, campaign: Campaign, subs: Vec<CampaignSubreddit>) -> Self {
        self.users.lock().unwrap().push(user);
        self.campaigns.lock().unwrap().push(campaign);
        self.subreddits.lock().unwrap().extend(subs);
        self
    }
}

#[async_trait]
impl DatabaseService for MockDatabaseService {
    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == campaign_id)
            .cloned())
    }

    async fn update_campaign_last_poll_at(&self, campaign_id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(c) = self
            .campaigns
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == campaign_id)
        {
            c.last_poll_at = Some(at);
        }
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: i64,
        status: crate::models::CampaignStatus,
    ) -> Result<()> {
        if let Some(c) = self
            .campaigns
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == campaign_id)
        {
            c.status = status;
        }
        Ok(())
    }

    async fn count_active_campaigns_for_user(&self, user_id: i64) -> Result<i64> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.owner_user_id == user_id && c.status != crate::models::CampaignStatus::Deleted
            })
            .count() as i64)
    }

    async fn create_campaign(
        &self,
        owner_user_id: i64,
        business_description: &str,
        search_queries: &[String],
        poll_interval_hours: i64,
    ) -> Result<Campaign> {
        let mut next = self.next_campaign_id.lock().unwrap();
        let id = *next;
        *next += 1;
        let campaign = Campaign {
            id,
            owner_user_id,
            status: crate::models::CampaignStatus::Discovering,
            business_description: business_description.to_string(),
            search_queries: search_queries.to_vec(),
            poll_interval_hours,
            last_poll_at: None,
            custom_comment_prompt: None,
            custom_dm_prompt: None,
        };
        self.campaigns.lock().unwrap().push(campaign.clone());
        Ok(campaign)
    }

    async fn replace_campaign_subreddits(
        &self,
        campaign_id: i64,
        names: &[String],
    ) -> Result<Vec<CampaignSubreddit>> {
        let mut subs = self.subreddits.lock().unwrap();
        subs.retain(|s| s.campaign_id != campaign_id);

        let mut next = self.next_subreddit_id.lock().unwrap();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let id = *next;
            *next += 1;
            let sub = CampaignSubreddit {
                id,
                campaign_id,
                name: name.clone(),
                title: None,
                description: None,
                subscribers: None,
                relevance_score: None,
                active: true,
            };
            subs.push(sub.clone());
            out.push(sub);
        }
        Ok(out)
    }

    async fn active_subreddits_for_campaign(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<CampaignSubreddit>> {
        Ok(self
            .subreddits
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.campaign_id == campaign_id && s.active)
            .cloned()
            .collect())
    }

    async fn pollable_campaigns(&self) -> Result<Vec<(User, Campaign)>> {
        let users = self.users.lock().unwrap();
        let campaigns = self.campaigns.lock().unwrap();
        let mut out = Vec::new();
        for c in campaigns.iter() {
            if c.status != crate::models::CampaignStatus::Active {
                continue;
            }
            if let Some(u) = users.iter().find(|u| u.id == c.owner_user_id) {
                if u.is_active && !u.is_blocked && !matches!(u.tier, crate::models::Tier::Expired) {
                    out.push((u.clone(), c.clone()));
                }
            }
        }
        Ok(out)
    }

    async fn create_poll_job(&self, campaign_id: i64, trigger: PollTrigger) -> Result<PollJob> {
        let mut next = self.next_poll_job_id.lock().unwrap();
        let id = *next;
        *next += 1;
        let job = new_poll_job(id, campaign_id, trigger);
        self.poll_jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn update_poll_job(&self, job: &PollJob) -> Result<()> {
        let mut jobs = self.poll_jobs.lock().unwrap();
        if let Some(existing) = jobs.iter_mut().find(|j| j.id == job.id) {
            *existing = job.clone();
            Ok(())
        } else {
            Err(anyhow!("poll job {} not found", job.id))
        }
    }

    async fn existing_reddit_post_ids(&self, campaign_id: i64) -> Result<HashSet<String>> {
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .map(|l| l.reddit_post_id.clone())
            .collect())
    }

    async fn insert_unscored_leads(
        &self,
        campaign_id: i64,
        poll_job_id: i64,
        posts: &[FetchedPost],
    ) -> Result<Vec<Lead>> {
        let mut next = self.next_lead_id.lock().unwrap();
        let mut leads = self.leads.lock().unwrap();
        let mut inserted = Vec::with_capacity(posts.len());
        for post in posts {
            if leads
                .iter()
                .any(|l| l.campaign_id == campaign_id && l.reddit_post_id == post.reddit_post_id)
            {
                continue;
            }
            let id = *next;
            *next += 1;
            let lead = Lead {
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
                relevancy_reason: "Pending scoring".to_string(),
                suggested_comment: String::new(),
                suggested_dm: String::new(),
                has_suggestions: false,
                suggestions_generated_at: None,
                status: LeadStatus::New,
                discovered_at: Utc::now(),
                updated_at: Utc::now(),
            };
            leads.push(lead.clone());
            inserted.push(lead);
        }
        Ok(inserted)
    }

    async fn leads_for_poll_job(&self, poll_job_id: i64) -> Result<Vec<Lead>> {
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.poll_job_id == Some(poll_job_id))
            .cloned()
            .collect())
    }

    async fn update_lead_score(&self, lead_id: i64, score: Option<i64>, reason: &str) -> Result<()> {
        if let Some(l) = self.leads.lock().unwrap().iter_mut().find(|l| l.id == lead_id) {
            l.relevancy_score = score;
            l.relevancy_reason = reason.to_string();
            l.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_lead_suggestions(
        &self,
        lead_id: i64,
        comment: &str,
        dm: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(l) = self.leads.lock().unwrap().iter_mut().find(|l| l.id == lead_id) {
            l.suggested_comment = comment.to_string();
            l.suggested_dm = dm.to_string();
            l.has_suggestions = true;
            l.suggestions_generated_at = Some(generated_at);
            l.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_leads(&self, lead_ids: &[i64]) -> Result<u64> {
        let mut leads = self.leads.lock().unwrap();
        let before = leads.len();
        leads.retain(|l| !lead_ids.contains(&l.id));
        Ok((before - leads.len()) as u64)
    }

    async fn upsert_subreddit_poll(&self, poll: &SubredditPoll) -> Result<()> {
        let mut polls = self.subreddit_polls.lock().unwrap();
        if let Some(existing) = polls.iter_mut().find(|p| p.name == poll.name) {
            existing.last_poll_at = poll.last_poll_at;
            existing.last_post_timestamp = poll.last_post_timestamp;
            existing.poll_count += 1;
            existing.total_posts_found += poll.total_posts_found;
        } else {
            polls.push(poll.clone());
        }
        Ok(())
    }

    async fn record_usage(
        &self,
        user_id: i64,
        api_kind: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()> {
        let mut usage = self.usage.lock().unwrap();
        if let Some(existing) = usage
            .iter_mut()
            .find(|(uid, kind, _, _)| *uid == user_id && kind == api_kind)
        {
            existing.2 += input_tokens;
            existing.3 += output_tokens;
        } else {
            usage.push((user_id, api_kind.to_string(), input_tokens, output_tokens));
        }
        Ok(())
    }
}

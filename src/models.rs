//! Persisted domain types. Mirrors the `leads`/`campaigns`/`poll_jobs`/...
//! tables in `migrations/`; field names match column names 1:1 so `sqlx`
//! query-as can bind them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    FreeTrial,
    Starter,
    Growth,
    Pro,
    /// `MONTHLY`/`ANNUALLY` predate the Starter/Growth/Pro split and are
    /// billed and scheduled exactly like Starter.
    Legacy,
    Expired,
}

impl Tier {
    pub fn from_str(s: &str) -> Self {
        match s {
            "free_trial" => Tier::FreeTrial,
            "starter" => Tier::Starter,
            "growth" => Tier::Growth,
            "pro" => Tier::Pro,
            "legacy" => Tier::Legacy,
            _ => Tier::Expired,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::FreeTrial => "free_trial",
            Tier::Starter => "starter",
            Tier::Growth => "growth",
            Tier::Pro => "pro",
            Tier::Legacy => "legacy",
            Tier::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub tier: Tier,
    pub is_active: bool,
    pub is_blocked: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
}

impl User {
    /// Account-status and expiry gate shared by the poll engine's
    /// pre-flight check and the scheduler's eligibility query.
    pub fn is_pollable(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.is_blocked {
            return false;
        }
        if matches!(self.tier, Tier::Expired) {
            return false;
        }
        if matches!(self.tier, Tier::FreeTrial) {
            if let Some(ends) = self.trial_ends_at {
                if ends < now {
                    return false;
                }
            }
        } else if let Some(ends) = self.subscription_ends_at {
            if ends < now {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Created, queries derived, awaiting subreddit selection.
    Discovering,
    Active,
    Paused,
    Completed,
    Deleted,
}

impl CampaignStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "discovering" => CampaignStatus::Discovering,
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "completed" => CampaignStatus::Completed,
            _ => CampaignStatus::Deleted,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Discovering => "discovering",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: i64,
    pub owner_user_id: i64,
    pub status: CampaignStatus,
    pub business_description: String,
    pub search_queries: Vec<String>,
    pub poll_interval_hours: i64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub custom_comment_prompt: Option<String>,
    pub custom_dm_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CampaignSubreddit {
    pub id: i64,
    pub campaign_id: i64,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subscribers: Option<i64>,
    pub relevance_score: Option<f64>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollJobStatus {
    Running,
    Completed,
    Failed,
}

impl PollJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PollJobStatus::Running => "running",
            PollJobStatus::Completed => "completed",
            PollJobStatus::Failed => "failed",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => PollJobStatus::Completed,
            "failed" => PollJobStatus::Failed,
            _ => PollJobStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Manual,
    Scheduled,
}

impl PollTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            PollTrigger::Manual => "manual",
            PollTrigger::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollJob {
    pub id: i64,
    pub campaign_id: i64,
    pub status: PollJobStatus,
    pub trigger: PollTrigger,
    pub subreddits_polled: i64,
    pub posts_fetched: i64,
    pub posts_scored: i64,
    pub leads_created: i64,
    pub leads_deleted: i64,
    pub suggestions_generated: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PollJob {
    /// `completedAt` is set if and only if the job has left RUNNING.
    pub fn invariant_completed_at_consistent(&self) -> bool {
        (self.status == PollJobStatus::Running) == self.completed_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadStatus {
    New,
    Viewed,
    Replied,
    Dismissed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Viewed => "viewed",
            LeadStatus::Replied => "replied",
            LeadStatus::Dismissed => "dismissed",
        }
    }
    pub fn from_str(s: &str) -> Self {
        match s {
            "viewed" => LeadStatus::Viewed,
            "replied" => LeadStatus::Replied,
            "dismissed" => LeadStatus::Dismissed,
            _ => LeadStatus::New,
        }
    }
}

/// The set every relevancy score snaps to. `ALLOWED_SCORES` in the
/// scoring service, ordered low to high.
pub const ALLOWED_SCORES: [i64; 7] = [0, 50, 60, 70, 80, 90, 100];

#[derive(Debug, Clone)]
pub struct Lead {
    pub id: i64,
    pub campaign_id: i64,
    pub poll_job_id: Option<i64>,
    pub reddit_post_id: String,
    pub subreddit_name: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub post_url: String,
    pub reddit_score: i64,
    pub num_comments: i64,
    pub created_at_utc: DateTime<Utc>,
    pub relevancy_score: Option<i64>,
    pub relevancy_reason: String,
    pub suggested_comment: String,
    pub suggested_dm: String,
    pub has_suggestions: bool,
    pub suggestions_generated_at: Option<DateTime<Utc>>,
    pub status: LeadStatus,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// `hasSuggestions` implies a score at/above the auto-suggestion
    /// threshold and a non-null generation timestamp.
    pub fn invariant_suggestions_consistent(&self, threshold: i64) -> bool {
        if !self.has_suggestions {
            return true;
        }
        self.relevancy_score.map_or(false, |s| s >= threshold)
            && self.suggestions_generated_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SubredditPoll {
    pub name: String,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_post_timestamp: Option<DateTime<Utc>>,
    pub poll_count: i64,
    pub total_posts_found: i64,
}

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub user_id: i64,
    pub api_kind: String,
    pub utc_day: chrono::NaiveDate,
    pub call_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// A post pulled from a [`crate::reddit_source::RedditSource`] before it
/// has been persisted as a [`Lead`].
#[derive(Debug, Clone)]
pub struct FetchedPost {
    pub reddit_post_id: String,
    pub subreddit_name: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub post_url: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_at_utc: DateTime<Utc>,
}

/// A community candidate returned by `search_communities`.
#[derive(Debug, Clone)]
pub struct SubredditCandidate {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subscribers: Option<i64>,
    pub is_nsfw: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_expired_tier_never_pollable() {
        let u = User {
            id: 1,
            email: "a@b.com".into(),
            tier: Tier::Expired,
            is_active: true,
            is_blocked: false,
            trial_ends_at: None,
            subscription_ends_at: None,
        };
        assert!(!u.is_pollable(Utc::now()));
    }

    #[test]
    fn trial_user_stops_being_pollable_after_trial_ends() {
        let now = Utc::now();
        let u = User {
            id: 1,
            email: "a@b.com".into(),
            tier: Tier::FreeTrial,
            is_active: true,
            is_blocked: false,
            trial_ends_at: Some(now - chrono::Duration::days(1)),
            subscription_ends_at: None,
        };
        assert!(!u.is_pollable(now));
    }

    #[test]
    fn poll_job_completed_at_invariant() {
        let base = PollJob {
            id: 1,
            campaign_id: 1,
            status: PollJobStatus::Running,
            trigger: PollTrigger::Manual,
            subreddits_polled: 0,
            posts_fetched: 0,
            posts_scored: 0,
            leads_created: 0,
            leads_deleted: 0,
            suggestions_generated: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        assert!(base.invariant_completed_at_consistent());

        let mut completed = base.clone();
        completed.status = PollJobStatus::Completed;
        assert!(!completed.invariant_completed_at_consistent());
        completed.completed_at = Some(Utc::now());
        assert!(completed.invariant_completed_at_consistent());
    }
}

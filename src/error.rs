//! Typed errors for the call sites that need to match on a reason rather
//! than just log and bail. Everything else uses `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollEngineError {
    #[error("campaign {0} is not active")]
    CampaignNotActive(i64),
    #[error("campaign {0} not found")]
    CampaignNotFound(i64),
    #[error("user {0} is not eligible for polling")]
    UserNotPollable(i64),
}

#[derive(Debug, Error)]
pub enum CampaignServiceError {
    #[error("user {user_id} does not own campaign {campaign_id}")]
    NotAuthorized { user_id: i64, campaign_id: i64 },
    #[error("plan limit exceeded: {0}")]
    PlanLimitExceeded(String),
}

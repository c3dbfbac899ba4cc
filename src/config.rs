use anyhow::{Context, Result};

/// Which backend serves [`crate::reddit_source::RedditSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedditApiProvider {
    Scraper,
    DirectApi,
}

/// Which backend serves [`crate::llm::LlmClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub reddit_user_agent: String,

    pub reddit_api_provider: RedditApiProvider,
    pub llm_provider: LlmProvider,

    pub apify_token: String,
    pub apify_reddit_actor_id: String,
    pub rapidapi_key: String,
    pub rapidapi_reddit_host: String,
    pub reddit_rate_limit_per_minute: u32,

    pub gemini_api_key: String,
    pub openai_api_key: String,

    pub enable_scheduled_polling: bool,
    pub poll_times_starter: Vec<u32>,
    pub poll_times_premium: Vec<u32>,

    pub default_batch_size: usize,
    pub max_concurrent: usize,
    pub min_relevancy_score: i64,
    pub auto_suggestion_threshold: i64,
}

/// Reddit's documented limit for unauthenticated requests is ~60/min.
/// We default well under that and refuse to go over it even if asked.
const MAX_RATE_LIMIT: u32 = 50;
const DEFAULT_RATE_LIMIT: u32 = 20;

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL is required (e.g., sqlite://data.db)")?;

        let reddit_user_agent = std::env::var("REDDIT_USER_AGENT")
            .unwrap_or_else(|_| "reddit-leadgen (https://example.com)".to_string());

        let reddit_api_provider = match std::env::var("REDDIT_API_PROVIDER")
            .unwrap_or_else(|_| "scraper".to_string())
            .to_lowercase()
            .as_str()
        {
            "rapidapi" | "direct" | "direct_api" => RedditApiProvider::DirectApi,
            _ => RedditApiProvider::Scraper,
        };

        let llm_provider = match std::env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "openai" => LlmProvider::OpenAi,
            _ => LlmProvider::Gemini,
        };

        let requested_rate = std::env::var("REDDIT_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let reddit_rate_limit_per_minute = if requested_rate > MAX_RATE_LIMIT {
            tracing::warn!(
                requested_rate,
                cap = MAX_RATE_LIMIT,
                "REDDIT_RATE_LIMIT_PER_MINUTE exceeds the safe maximum, capping"
            );
            MAX_RATE_LIMIT
        } else {
            requested_rate
        };

        let enable_scheduled_polling = std::env::var("ENABLE_SCHEDULED_POLLING")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let poll_times_starter = parse_hours(
            &std::env::var("POLL_TIMES_STARTER").unwrap_or_else(|_| "7,16".to_string()),
        )?;
        let poll_times_premium = parse_hours(
            &std::env::var("POLL_TIMES_PREMIUM").unwrap_or_else(|_| "7,11,16,22".to_string()),
        )?;

        let default_batch_size = std::env::var("DEFAULT_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);
        let max_concurrent = std::env::var("MAX_CONCURRENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let min_relevancy_score = std::env::var("MIN_RELEVANCY_SCORE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let auto_suggestion_threshold = std::env::var("AUTO_SUGGESTION_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(90);

        Ok(Self {
            database_url,
            reddit_user_agent,
            reddit_api_provider,
            llm_provider,
            apify_token: std::env::var("APIFY_TOKEN").unwrap_or_default(),
            apify_reddit_actor_id: std::env::var("APIFY_REDDIT_ACTOR_ID")
                .unwrap_or_else(|_| "trudax/reddit-scraper".to_string()),
            rapidapi_key: std::env::var("RAPIDAPI_KEY").unwrap_or_default(),
            rapidapi_reddit_host: std::env::var("RAPIDAPI_REDDIT_HOST")
                .unwrap_or_else(|_| "reddit34.p.rapidapi.com".to_string()),
            reddit_rate_limit_per_minute,
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            enable_scheduled_polling,
            poll_times_starter,
            poll_times_premium,
            default_batch_size,
            max_concurrent,
            min_relevancy_score,
            auto_suggestion_threshold,
        })
    }
}

fn parse_hours(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(|s| s.trim().parse::<u32>().context("invalid poll-hours configuration"))
        .collect()
}

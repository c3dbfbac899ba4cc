pub mod direct_api;
pub mod scraper;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{AppConfig, RedditApiProvider};
use crate::models::{FetchedPost, SubredditCandidate};

/// The two interchangeable backends both speak this trait; callers never
/// see which HTTP protocol is behind it.
#[async_trait]
pub trait RedditSource: Send + Sync {
    async fn search_communities(&self, query: &str, limit: usize) -> Result<Vec<SubredditCandidate>>;
    async fn scrape_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<FetchedPost>>;
}

pub fn build(config: &AppConfig, client: reqwest::Client) -> Box<dyn RedditSource> {
    match config.reddit_api_provider {
        RedditApiProvider::Scraper => Box::new(scraper::ScraperProvider::new(config, client)),
        RedditApiProvider::DirectApi => Box::new(direct_api::DirectApiProvider::new(config, client)),
    }
}

/// Shared field-aliasing helpers: providers normalize their raw JSON
/// into these before anything upstream sees a post.
pub(crate) fn first_non_empty(candidates: &[Option<&str>], default: &str) -> String {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| default.to_string())
}

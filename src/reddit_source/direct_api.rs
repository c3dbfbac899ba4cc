//! Paginated GET-style provider against a RapidAPI Reddit proxy, walking
//! an `after` cursor page by page the way the official Reddit JSON API
//! does.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::AppConfig;
use crate::models::{FetchedPost, SubredditCandidate};
use crate::rate_limiter::RateLimiter;
use crate::reddit_source::{first_non_empty, RedditSource};

const PAGE_SIZE: usize = 100;

pub struct DirectApiProvider {
    client: reqwest::Client,
    key: String,
    host: String,
    rate_limiter: RateLimiter,
}

impl DirectApiProvider {
    pub fn new(config: &AppConfig, client: reqwest::Client) -> Self {
        let per_minute = config.reddit_rate_limit_per_minute.max(1);
        Self {
            client,
            key: config.rapidapi_key.clone(),
            host: config.rapidapi_reddit_host.clone(),
            rate_limiter: RateLimiter::new(
                per_minute,
                std::time::Duration::from_secs(60) / per_minute,
            ),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.rate_limiter.acquire().await;
        let url = format!("https://{}{path}", self.host);
        self.client
            .get(&url)
            .header("x-rapidapi-key", &self.key)
            .header("x-rapidapi-host", &self.host)
            .query(query)
            .send()
            .await
            .context("calling reddit direct-api provider")?
            .error_for_status()
            .context("reddit direct-api provider returned an error status")?
            .json()
            .await
            .context("parsing reddit direct-api provider response")
    }
}

#[async_trait]
impl RedditSource for DirectApiProvider {
    async fn search_communities(&self, query: &str, limit: usize) -> Result<Vec<SubredditCandidate>> {
        let body = self
            .get("/search_communities", &[("query", query.to_string())])
            .await?;

        let mut candidates: Vec<SubredditCandidate> = body["communities"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|c| !c["over_18"].as_bool().unwrap_or(false))
            .map(|c| SubredditCandidate {
                name: c["name"]
                    .as_str()
                    .unwrap_or_default()
                    .trim_start_matches("r/")
                    .to_string(),
                title: c["title"].as_str().map(str::to_string),
                description: c["public_description"].as_str().map(str::to_string),
                subscribers: c["subscribers"].as_i64(),
                is_nsfw: false,
            })
            .collect();

        candidates.sort_by(|a, b| b.subscribers.unwrap_or(0).cmp(&a.subscribers.unwrap_or(0)));
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.name.clone()));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn scrape_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<FetchedPost>> {
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("subreddit", subreddit.to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page = self.get("/new", &query).await?;
            let children = page["data"]["children"].as_array().cloned().unwrap_or_default();
            if children.is_empty() {
                break;
            }

            for child in &children {
                let item = &child["data"];
                if item["over_18"].as_bool().unwrap_or(false) {
                    continue;
                }
                if let Some(post) = parse_post(item, subreddit) {
                    posts.push(post);
                }
                if posts.len() >= limit {
                    return Ok(posts);
                }
            }

            after = page["data"]["after"].as_str().map(str::to_string);
            if after.is_none() {
                break;
            }
        }

        Ok(posts)
    }
}

fn parse_post(item: &Value, subreddit: &str) -> Option<FetchedPost> {
    let post_id = item["id"].as_str()?.to_string();
    let author = first_non_empty(&[item["author"].as_str()], "[deleted]");
    let score = item["score"].as_i64().or_else(|| item["ups"].as_i64()).unwrap_or(0);
    let num_comments = item["num_comments"].as_i64().unwrap_or(0);
    let created_at_utc = item["created_utc"]
        .as_f64()
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or_else(Utc::now);

    Some(FetchedPost {
        reddit_post_id: post_id.clone(),
        subreddit_name: subreddit.to_string(),
        title: item["title"].as_str().unwrap_or_default().to_string(),
        content: item["selftext"].as_str().unwrap_or_default().to_string(),
        author,
        post_url: item["permalink"]
            .as_str()
            .map(|p| format!("https://www.reddit.com{p}"))
            .unwrap_or_else(|| format!("https://www.reddit.com/r/{subreddit}/comments/{post_id}/")),
        score,
        num_comments,
        created_at_utc,
    })
}

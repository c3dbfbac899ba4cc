//! Actor-run-and-poll style provider: submit a scrape job, poll its run
//! status, then fetch the finished dataset. Grounded on the Apify
//! actor-run protocol (`POST .../runs`, poll `GET .../runs/{id}`, then
//! `GET .../datasets/{id}/items`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::{FetchedPost, SubredditCandidate};
use crate::reddit_source::{first_non_empty, RedditSource};

const BASE_URL: &str = "https://api.apify.com/v2";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLL_ATTEMPTS: u32 = 24; // ~2 minutes

pub struct ScraperProvider {
    client: reqwest::Client,
    token: String,
    actor_id: String,
}

impl ScraperProvider {
    pub fn new(config: &AppConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            token: config.apify_token.clone(),
            actor_id: config.apify_reddit_actor_id.clone(),
        }
    }

    async fn run_actor(&self, run_input: Value) -> Result<Vec<Value>> {
        let submit_url = format!(
            "{BASE_URL}/acts/{}/runs?token={}",
            self.actor_id.replace('/', "~"),
            self.token
        );
        let submitted: Value = self
            .client
            .post(&submit_url)
            .json(&run_input)
            .send()
            .await
            .context("submitting actor run")?
            .error_for_status()
            .context("actor run submission rejected")?
            .json()
            .await?;

        let run_id = submitted["data"]["id"]
            .as_str()
            .context("actor run response missing data.id")?
            .to_string();

        let status_url = format!("{BASE_URL}/actor-runs/{run_id}?token={}", self.token);
        let mut attempt = 0;
        let dataset_id = loop {
            attempt += 1;
            let status: Value = self.client.get(&status_url).send().await?.json().await?;
            let status_str = status["data"]["status"].as_str().unwrap_or("");
            match status_str {
                "SUCCEEDED" => {
                    break status["data"]["defaultDatasetId"]
                        .as_str()
                        .context("succeeded run missing defaultDatasetId")?
                        .to_string();
                }
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    tracing::warn!(run_id, status = status_str, "actor run did not succeed");
                    return Ok(Vec::new());
                }
                _ if attempt >= MAX_POLL_ATTEMPTS => {
                    bail!("actor run {run_id} did not finish within the poll budget");
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        };

        let items_url = format!("{BASE_URL}/datasets/{dataset_id}/items?token={}", self.token);
        let items: Vec<Value> = self.client.get(&items_url).send().await?.json().await?;
        Ok(items)
    }
}

#[async_trait]
impl RedditSource for ScraperProvider {
    async fn search_communities(&self, query: &str, limit: usize) -> Result<Vec<SubredditCandidate>> {
        let run_input = json!({
            "searches": [query],
            "type": "community",
            "maxItems": limit,
        });
        let items = self.run_actor(run_input).await?;

        let mut candidates: Vec<SubredditCandidate> = items
            .iter()
            .filter(|item| !item["over18"].as_bool().unwrap_or(false))
            .map(|item| SubredditCandidate {
                name: item["name"]
                    .as_str()
                    .unwrap_or_default()
                    .trim_start_matches("r/")
                    .to_string(),
                title: item["title"].as_str().map(str::to_string),
                description: item["description"].as_str().map(str::to_string),
                subscribers: item["numberOfMembers"].as_i64(),
                is_nsfw: false,
            })
            .collect();

        // Dedup by name, keeping the entry with the most subscribers.
        candidates.sort_by(|a, b| b.subscribers.unwrap_or(0).cmp(&a.subscribers.unwrap_or(0)));
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.name.clone()));
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn scrape_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<FetchedPost>> {
        let run_input = json!({
            "startUrls": [{"url": format!("https://www.reddit.com/r/{subreddit}/new/")}],
            "maxItems": limit,
            "proxy": {"useApifyProxy": true, "apifyProxyGroups": ["RESIDENTIAL"]},
        });
        let items = self.run_actor(run_input).await?;

        let posts = items
            .iter()
            .filter(|item| !item["over18"].as_bool().unwrap_or(false))
            .filter_map(|item| parse_item(item, subreddit))
            .collect();
        Ok(posts)
    }
}

fn parse_item(item: &Value, subreddit: &str) -> Option<FetchedPost> {
    let post_id = item["id"]
        .as_str()
        .or_else(|| item["url"].as_str().and_then(extract_post_id_from_url))
        .map(str::to_string)?;

    let author = first_non_empty(
        &[
            item["authorName"].as_str(),
            item["author"].as_str(),
            item["authorFullname"].as_str(),
            item["author_fullname"].as_str(),
        ],
        "[deleted]",
    );

    let score = item["score"]
        .as_i64()
        .or_else(|| item["upVotes"].as_i64())
        .unwrap_or(0);
    let num_comments = item["numberOfComments"]
        .as_i64()
        .or_else(|| item["numComments"].as_i64())
        .unwrap_or(0);

    let created_at_utc = item["createdAt"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(FetchedPost {
        reddit_post_id: post_id.clone(),
        subreddit_name: subreddit.to_string(),
        title: item["title"].as_str().unwrap_or_default().to_string(),
        content: item["body"]
            .as_str()
            .or_else(|| item["text"].as_str())
            .unwrap_or_default()
            .to_string(),
        author,
        post_url: item["url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://www.reddit.com/r/{subreddit}/comments/{post_id}/")),
        score,
        num_comments,
        created_at_utc,
    })
}

fn extract_post_id_from_url(url: &str) -> Option<&str> {
    url.split("/comments/").nth(1)?.split('/').next()
}

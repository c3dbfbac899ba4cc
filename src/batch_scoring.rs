//! Two-phase LLM scoring: a cheap batched first pass scores every post
//! into a small discrete bucket, then a second pass spends a full call
//! per lead only on the survivors worth drafting a reply for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::llm::{extract_json, LlmClient};
use crate::models::ALLOWED_SCORES;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const AUTO_SUGGESTION_THRESHOLD: i64 = 90;

#[derive(Debug, Clone)]
pub struct ScorableLead {
    pub lead_id: i64,
    pub reddit_post_id: String,
    pub title: String,
    pub content: String,
    pub subreddit_name: String,
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub lead_id: i64,
    pub score: i64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SuggestableLead {
    pub lead_id: i64,
    pub title: String,
    pub content: String,
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct SuggestionResult {
    pub lead_id: i64,
    pub comment: String,
    pub dm: String,
}

pub struct BatchScoringService {
    llm: Arc<dyn LlmClient>,
    batch_size: usize,
    max_concurrent: usize,
    llm_calls_made: AtomicUsize,
    suggestion_calls_made: AtomicUsize,
}

impl BatchScoringService {
    pub fn new(llm: Arc<dyn LlmClient>, batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            llm,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
            llm_calls_made: AtomicUsize::new(0),
            suggestion_calls_made: AtomicUsize::new(0),
        }
    }

    pub fn llm_calls_made(&self) -> usize {
        self.llm_calls_made.load(Ordering::Relaxed)
    }

    /// Number of suggestion calls issued by the most recent
    /// [`Self::generate_suggestions_for_high_score`] call — one per
    /// survivor attempted, whether or not the call ultimately succeeded.
    pub fn suggestion_calls_made(&self) -> usize {
        self.suggestion_calls_made.load(Ordering::Relaxed)
    }

    /// One LLM call per `ceil(N / batch_size)` chunk, all chunks run
    /// concurrently behind a semaphore of width `max_concurrent`.
    pub async fn batch_quick_score(
        &self,
        leads: &[ScorableLead],
        business_description: &str,
    ) -> Vec<ScoreResult> {
        self.llm_calls_made.store(0, Ordering::Relaxed);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for chunk in leads.chunks(self.batch_size) {
            let chunk = chunk.to_vec();
            let llm = self.llm.clone();
            let semaphore = semaphore.clone();
            let business_description = business_description.to_string();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                score_one_batch(llm.as_ref(), &chunk, &business_description).await
            });
        }

        let mut calls = 0usize;
        let mut results = Vec::with_capacity(leads.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(batch_result) => {
                    calls += 1;
                    results.extend(batch_result);
                }
                Err(e) => {
                    tracing::error!(error = %e, "scoring task panicked");
                }
            }
        }
        self.llm_calls_made.store(calls, Ordering::Relaxed);
        results
    }

    /// Drafts a comment + DM for the highest-scoring survivors, capped
    /// at `cap` (the tier's `max_auto_suggestions`).
    pub async fn generate_suggestions_for_high_score(
        &self,
        leads: &[SuggestableLead],
        business_description: &str,
        min_score: i64,
        cap: usize,
    ) -> Vec<SuggestionResult> {
        let mut sorted: Vec<&SuggestableLead> =
            leads.iter().filter(|l| l.score >= min_score).collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score));
        sorted.truncate(cap);

        self.suggestion_calls_made.store(sorted.len(), Ordering::Relaxed);
        if sorted.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for lead in sorted {
            let lead = lead.clone();
            let llm = self.llm.clone();
            let semaphore = semaphore.clone();
            let business_description = business_description.to_string();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                suggest_one(llm.as_ref(), &lead, &business_description).await
            });
        }

        let mut out = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(result)) = joined {
                out.push(result);
            }
        }
        out
    }

    /// Single-lead, single-call path used outside the poll pipeline when
    /// a user opens a lead that never earned an automatic suggestion.
    pub async fn suggest_on_demand(
        &self,
        lead: &SuggestableLead,
        business_description: &str,
    ) -> SuggestionResult {
        suggest_one(self.llm.as_ref(), lead, business_description)
            .await
            .unwrap_or(SuggestionResult {
                lead_id: lead.lead_id,
                comment: String::new(),
                dm: String::new(),
            })
    }
}

async fn score_one_batch(
    llm: &dyn LlmClient,
    chunk: &[ScorableLead],
    business_description: &str,
) -> Vec<ScoreResult> {
    let prompt = quick_score_prompt(chunk, business_description);

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            return chunk
                .iter()
                .map(|l| ScoreResult {
                    lead_id: l.lead_id,
                    score: 50,
                    reason: format!("Batch error: {e}"),
                })
                .collect();
        }
    };

    let parsed = match extract_json(&response) {
        Ok(v) => v,
        Err(e) => {
            return chunk
                .iter()
                .map(|l| ScoreResult {
                    lead_id: l.lead_id,
                    score: 50,
                    reason: format!("Batch error: {e}"),
                })
                .collect();
        }
    };

    let scores_by_post: std::collections::HashMap<String, (i64, String)> = parsed["scores"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let id = entry["post_id"].as_str()?.to_string();
            let score = entry["relevancy_score"].as_i64()?;
            let reason = entry["relevancy_reason"].as_str().unwrap_or("").to_string();
            Some((id, (score, reason)))
        })
        .collect();

    chunk
        .iter()
        .map(|lead| match scores_by_post.get(&lead.reddit_post_id) {
            Some((raw_score, reason)) => ScoreResult {
                lead_id: lead.lead_id,
                score: snap_to_allowed(*raw_score),
                reason: reason.clone(),
            },
            None => ScoreResult {
                lead_id: lead.lead_id,
                score: 50,
                reason: "Score not returned".to_string(),
            },
        })
        .collect()
}

async fn suggest_one(
    llm: &dyn LlmClient,
    lead: &SuggestableLead,
    business_description: &str,
) -> Option<SuggestionResult> {
    let prompt = suggestion_prompt(lead, business_description);
    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(lead_id = lead.lead_id, error = %e, "suggestion generation failed");
            return None;
        }
    };
    let parsed = extract_json(&response).ok()?;
    Some(SuggestionResult {
        lead_id: lead.lead_id,
        comment: parsed["suggested_comment"].as_str().unwrap_or_default().to_string(),
        dm: parsed["suggested_dm"].as_str().unwrap_or_default().to_string(),
    })
}

/// Snaps any out-of-set score to the nearest value in [`ALLOWED_SCORES`].
fn snap_to_allowed(raw: i64) -> i64 {
    *ALLOWED_SCORES
        .iter()
        .min_by_key(|candidate| (*candidate - raw).abs())
        .unwrap()
}

fn quick_score_prompt(chunk: &[ScorableLead], business_description: &str) -> String {
    let posts = json!(chunk
        .iter()
        .map(|l| json!({
            "post_id": l.reddit_post_id,
            "subreddit": l.subreddit_name,
            "title": l.title,
            "content": l.content.chars().take(500).collect::<String>(),
        }))
        .collect::<Vec<_>>());

    format!(
        "You score Reddit posts for relevance to this business: {business_description}\n\
         Score each post 0, 50, 60, 70, 80, 90, or 100 (nothing else).\n\
         Respond as JSON: {{\"scores\": [{{\"post_id\": str, \"relevancy_score\": int, \"relevancy_reason\": str}}]}}\n\
         Posts: {posts}"
    )
}

fn suggestion_prompt(lead: &SuggestableLead, business_description: &str) -> String {
    format!(
        "Business: {business_description}\n\
         Draft a short, non-spammy comment reply and a short DM pitch for this Reddit post.\n\
         Title: {}\nContent: {}\n\
         Respond as JSON: {{\"suggested_comment\": str, \"suggested_dm\": str}}",
        lead.title, lead.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snaps_to_nearest_allowed_score() {
        assert_eq!(snap_to_allowed(52), 50);
        assert_eq!(snap_to_allowed(65), 60);
        assert_eq!(snap_to_allowed(-10), 0);
        assert_eq!(snap_to_allowed(95), 90);
        assert_eq!(snap_to_allowed(100), 100);
    }

    #[test]
    fn call_count_is_ceil_division() {
        // batch_size=20, 45 leads -> ceil(45/20) = 3 chunks/calls
        let leads: Vec<ScorableLead> = (0..45)
            .map(|i| ScorableLead {
                lead_id: i,
                reddit_post_id: format!("p{i}"),
                title: "t".into(),
                content: "c".into(),
                subreddit_name: "rust".into(),
            })
            .collect();
        let chunks: Vec<_> = leads.chunks(20).collect();
        assert_eq!(chunks.len(), 3);
    }
}

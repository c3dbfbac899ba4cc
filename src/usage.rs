//! Thin façade over `DatabaseService::record_usage` naming the two API
//! kinds callers track against. The actual upsert-on-conflict lives in
//! the database layer; this just fixes the vocabulary so callers never
//! hand-roll a kind string.

use anyhow::Result;

use crate::services::DatabaseService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    RedditScraper,
    RedditDirectApi,
    LlmGemini,
    LlmOpenAi,
}

impl ApiKind {
    fn as_str(self) -> &'static str {
        match self {
            ApiKind::RedditScraper => "reddit_scraper",
            ApiKind::RedditDirectApi => "reddit_direct_api",
            ApiKind::LlmGemini => "llm_gemini",
            ApiKind::LlmOpenAi => "llm_openai",
        }
    }
}

pub struct UsageCounter;

impl UsageCounter {
    pub async fn record(
        db: &dyn DatabaseService,
        user_id: i64,
        kind: ApiKind,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()> {
        db.record_usage(user_id, kind.as_str(), input_tokens, output_tokens)
            .await
    }
}

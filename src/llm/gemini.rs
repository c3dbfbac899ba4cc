use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::AppConfig;
use crate::llm::LlmClient;

const ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: config.gemini_api_key.clone(),
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        let resp: serde_json::Value = self
            .client
            .post(ENDPOINT)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .context("calling Gemini")?
            .error_for_status()
            .context("Gemini returned an error status")?
            .json()
            .await
            .context("parsing Gemini response")?;

        resp["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .context("Gemini response missing candidate text")
    }
}

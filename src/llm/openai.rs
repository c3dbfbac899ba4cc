use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::AppConfig;
use crate::llm::LlmClient;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: config.openai_api_key.clone(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp: serde_json::Value = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("calling OpenAI")?
            .error_for_status()
            .context("OpenAI returned an error status")?
            .json()
            .await
            .context("parsing OpenAI response")?;

        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .context("OpenAI response missing message content")
    }
}

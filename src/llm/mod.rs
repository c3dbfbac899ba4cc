pub mod gemini;
pub mod json_extract;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{AppConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub fn build(config: &AppConfig, client: reqwest::Client) -> Box<dyn LlmClient> {
    match config.llm_provider {
        LlmProvider::Gemini => Box::new(gemini::GeminiClient::new(config, client)),
        LlmProvider::OpenAi => Box::new(openai::OpenAiClient::new(config, client)),
    }
}

pub use json_extract::extract_json;

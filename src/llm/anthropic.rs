use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::gemini::truncate;
use crate::llm::provider::LlmProvider;

pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(AnthropicProvider {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/models", BASE_URL);
        let resp = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(|e| ApiError::provider(self.name(), e))?;
        Ok(resp.status().is_success())
    }

    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let url = format!("{}/messages", BASE_URL);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::provider(self.name(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ApiError::provider(
                self.name(),
                format!("status {}: {}", status, truncate(&detail, 200)),
            ));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::provider(self.name(), e))?;
        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::provider(self.name(), "unexpected response format"))
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(GeminiProvider {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/models", BASE_URL);
        let resp = self
            .client
            .get(&url)
            .header("X-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::provider(self.name(), e))?;
        Ok(resp.status().is_success())
    }

    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let url = format!("{}/models/{}:generateContent", BASE_URL, self.model);
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        let resp = self
            .client
            .post(&url)
            .header("X-goog-api-key", &self.api_key)
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
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::provider(self.name(), "unexpected response format"))
    }
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

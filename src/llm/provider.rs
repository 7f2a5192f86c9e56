use async_trait::async_trait;

use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "gemini", "openai", "anthropic")
    fn name(&self) -> &str;

    /// check if the provider is reachable with the configured credentials
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// single-turn completion: prompt in, answer text out
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

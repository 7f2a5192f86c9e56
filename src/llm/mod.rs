use std::sync::Arc;
use std::time::Duration;

use crate::core::config::settings::LlmConfig;
use crate::core::errors::ApiError;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod provider;

pub use prompt::{build_prompt, PromptTemplate};
pub use provider::LlmProvider;

/// Resolves the configured provider once, at startup. An unknown name or a
/// missing key is a configuration error, not a per-request branch.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ApiError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ApiError::BadRequest("llm.api_key is required".to_string()))?;
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "gemini" => Arc::new(gemini::GeminiProvider::new(
            api_key,
            config.model.clone(),
            timeout,
        )?),
        "openai" => Arc::new(openai::OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.max_tokens,
            timeout,
        )?),
        "anthropic" => Arc::new(anthropic::AnthropicProvider::new(
            api_key,
            config.model.clone(),
            config.max_tokens,
            timeout,
        )?),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown LLM provider: {}",
                other
            )))
        }
    };
    Ok(provider)
}

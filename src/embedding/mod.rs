use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::config::settings::EmbeddingConfig;
use crate::core::errors::ApiError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn health_check(&self) -> Result<bool, ApiError>;
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Talks to an OpenAI-compatible `/v1/embeddings` endpoint (LM Studio,
/// llama.cpp server, or a hosted API).
pub struct HttpEmbeddingProvider {
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::internal)?;
        Ok(HttpEmbeddingProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::provider("Embedding", e))?;
        Ok(resp.status().is_success())
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| ApiError::provider("Embedding", e))?;
        if !resp.status().is_success() {
            return Err(ApiError::provider(
                "Embedding",
                format!("status {}", resp.status()),
            ));
        }

        let payload: Value = resp.json().await.map_err(|e| ApiError::provider("Embedding", e))?;
        let data = payload["data"]
            .as_array()
            .ok_or_else(|| ApiError::provider("Embedding", "response missing data array"))?;
        if data.len() != inputs.len() {
            return Err(ApiError::provider(
                "Embedding",
                format!("expected {} vectors, got {}", inputs.len(), data.len()),
            ));
        }

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let values = entry["embedding"]
                .as_array()
                .ok_or_else(|| ApiError::provider("Embedding", "response missing embedding"))?;
            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect();
            if vector.len() != self.dimension {
                return Err(ApiError::Internal(format!(
                    "embedding endpoint returned dimension {}, configured {}",
                    vector.len(),
                    self.dimension
                )));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

pub const KNOWN_LLM_PROVIDERS: [&str; 3] = ["gemini", "openai", "anthropic"];
pub const KNOWN_SEARCH_PROVIDERS: [&str; 3] = ["duckduckgo", "google", "bing"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub web_search: WebSearchConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8900,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "text-embedding-all-minilm-l6-v2".to_string(),
            dimension: 384,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: "gemini".to_string(),
            model: None,
            api_key: None,
            max_tokens: 512,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub provider: String,
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    pub site_filter: Option<String>,
    pub num_results: usize,
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        WebSearchConfig {
            enabled: false,
            provider: "duckduckgo".to_string(),
            api_key: None,
            engine_id: None,
            site_filter: Some("microcenter.com".to_string()),
            num_results: 3,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub auto_load: bool,
    pub documents_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `config.yml` (missing file means all defaults), applies
    /// environment overrides, and validates. A malformed file or an invalid
    /// combination of settings is fatal.
    pub fn load(paths: &AppPaths) -> anyhow::Result<AppConfig> {
        let mut config = if paths.config_path.exists() {
            let raw = fs::read_to_string(&paths.config_path)
                .with_context(|| format!("failed to read {}", paths.config_path.display()))?;
            AppConfig::from_yaml_str(&raw)
                .with_context(|| format!("failed to parse {}", paths.config_path.display()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<AppConfig> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = env::var("LLM_PROVIDER") {
            self.llm.provider = provider.to_lowercase();
        }
        if let Ok(key) = env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(key) = env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Ok(flag) = env::var("ENABLE_WEB_SEARCH") {
            self.web_search.enabled = flag.eq_ignore_ascii_case("true");
        }
        if let Ok(provider) = env::var("WEB_SEARCH_PROVIDER") {
            self.web_search.provider = provider.to_lowercase();
        }
        if let Ok(key) = env::var("SEARCH_API_KEY") {
            self.web_search.api_key = Some(key);
        }
        if let Ok(id) = env::var("GOOGLE_SEARCH_ENGINE_ID") {
            self.web_search.engine_id = Some(id);
        }
        if let Ok(dir) = env::var("DOCUMENTS_DIR") {
            self.ingest.documents_dir = Some(PathBuf::from(dir));
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be greater than zero");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be greater than zero");
        }
        if !KNOWN_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            bail!("unknown LLM provider: {}", self.llm.provider);
        }
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            bail!("llm.api_key (or the LLM_API_KEY environment variable) is required");
        }
        if self.web_search.enabled {
            match self.web_search.provider.as_str() {
                "google" => {
                    if self.web_search.api_key.is_none() || self.web_search.engine_id.is_none() {
                        bail!("google web search requires an API key and a search engine id");
                    }
                }
                "bing" => {
                    if self.web_search.api_key.is_none() {
                        bail!("bing web search requires an API key");
                    }
                }
                "duckduckgo" => {}
                other => bail!("unknown web search provider: {}", other),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("test-key".to_string());
        config
    }

    #[test]
    fn defaults_from_empty_yaml() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.provider, "gemini");
        assert!(!config.web_search.enabled);
    }

    #[test]
    fn partial_yaml_overrides_only_named_keys() {
        let raw = "chunking:\n  chunk_size: 700\nllm:\n  provider: openai\n";
        let config = AppConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.chunking.chunk_size, 700);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.server.port, 8900);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut config = valid_config();
        config.chunking.chunk_size = 100;
        config.chunking.chunk_overlap = 100;
        assert!(config.validate().is_err());

        config.chunking.chunk_overlap = 99;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_llm_provider() {
        let mut config = valid_config();
        config.llm.provider = "mistral".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("unknown LLM provider"));
    }

    #[test]
    fn rejects_missing_llm_api_key() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_google_search_without_credentials() {
        let mut config = valid_config();
        config.web_search.enabled = true;
        config.web_search.provider = "google".to_string();
        assert!(config.validate().is_err());

        config.web_search.api_key = Some("k".to_string());
        config.web_search.engine_id = Some("cx".to_string());
        assert!(config.validate().is_ok());
    }
}

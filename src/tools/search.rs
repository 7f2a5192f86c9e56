use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::settings::WebSearchConfig;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    DuckDuckGo,
    Google,
    Bing,
}

pub struct WebSearchClient {
    provider: Provider,
    api_key: Option<String>,
    engine_id: Option<String>,
    site_filter: Option<String>,
    num_results: usize,
    client: reqwest::Client,
}

impl WebSearchClient {
    /// Credentials are checked here so a misconfigured provider fails at
    /// startup, not on the first query.
    pub fn from_config(config: &WebSearchConfig) -> Result<Self, ApiError> {
        let provider = match config.provider.as_str() {
            "duckduckgo" => Provider::DuckDuckGo,
            "google" => Provider::Google,
            "bing" => Provider::Bing,
            other => {
                return Err(ApiError::BadRequest(format!(
                    "unknown web search provider: {}",
                    other
                )))
            }
        };
        match provider {
            Provider::Google if config.api_key.is_none() || config.engine_id.is_none() => {
                return Err(ApiError::BadRequest(
                    "google web search requires an API key and a search engine id".to_string(),
                ));
            }
            Provider::Bing if config.api_key.is_none() => {
                return Err(ApiError::BadRequest(
                    "bing web search requires an API key".to_string(),
                ));
            }
            _ => {}
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(WebSearchClient {
            provider,
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            site_filter: config.site_filter.clone(),
            num_results: config.num_results,
            client,
        })
    }

    pub fn default_num_results(&self) -> usize {
        self.num_results
    }

    pub fn default_site_filter(&self) -> Option<&str> {
        self.site_filter.as_deref()
    }

    pub async fn search(
        &self,
        query: &str,
        num_results: usize,
        site_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let query = apply_site_filter(query, site_filter);
        let mut results = match self.provider {
            Provider::Google => self.google_search(&query, num_results).await?,
            Provider::Bing => self.bing_search(&query, num_results).await?,
            Provider::DuckDuckGo => self.duckduckgo_search(&query).await?,
        };
        results.truncate(num_results);
        Ok(results)
    }

    async fn google_search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}&num={}",
            self.api_key.as_deref().unwrap_or(""),
            self.engine_id.as_deref().unwrap_or(""),
            urlencoding::encode(query),
            num_results.min(10)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::provider("Google search", e))?;
        if !response.status().is_success() {
            return Err(ApiError::provider(
                "Google search",
                format!("status {}", response.status()),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ApiError::provider("Google search", e))?;
        let items = payload
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for item in items {
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get("link").and_then(|v| v.as_str()).unwrap_or("");
            let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
            if !title.is_empty() && !url.is_empty() {
                results.push(SearchResult {
                    title: title.to_string(),
                    url: url.to_string(),
                    snippet: snippet.to_string(),
                });
            }
        }
        Ok(results)
    }

    async fn bing_search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let url = format!(
            "https://api.bing.microsoft.com/v7.0/search?q={}&count={}",
            urlencoding::encode(query),
            num_results.min(50)
        );

        let response = self
            .client
            .get(url)
            .header("Ocp-Apim-Subscription-Key", self.api_key.as_deref().unwrap_or(""))
            .send()
            .await
            .map_err(|e| ApiError::provider("Bing search", e))?;
        if !response.status().is_success() {
            return Err(ApiError::provider(
                "Bing search",
                format!("status {}", response.status()),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ApiError::provider("Bing search", e))?;
        let mut results = Vec::new();
        if let Some(items) = payload
            .get("webPages")
            .and_then(|wp| wp.get("value"))
            .and_then(|v| v.as_array())
        {
            for item in items {
                let title = item.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
                let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
                if !title.is_empty() && !url.is_empty() {
                    results.push(SearchResult {
                        title: title.to_string(),
                        url: url.to_string(),
                        snippet: snippet.to_string(),
                    });
                }
            }
        }
        Ok(results)
    }

    async fn duckduckgo_search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::provider("DuckDuckGo search", e))?;
        if !response.status().is_success() {
            return Err(ApiError::provider(
                "DuckDuckGo search",
                format!("status {}", response.status()),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ApiError::provider("DuckDuckGo search", e))?;
        let mut results = Vec::new();

        if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
            if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
                if !abstract_text.is_empty() && !url.is_empty() {
                    results.push(SearchResult {
                        title: abstract_text
                            .split(" - ")
                            .next()
                            .unwrap_or(abstract_text)
                            .to_string(),
                        url: url.to_string(),
                        snippet: abstract_text.to_string(),
                    });
                }
            }
        }

        if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
            extract_ddg_topics(items, &mut results);
        }
        if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            extract_ddg_topics(items, &mut results);
        }
        Ok(results)
    }
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

fn apply_site_filter(query: &str, site_filter: Option<&str>) -> String {
    match site_filter {
        Some(site) if !site.is_empty() => format!("site:{} {}", site, query),
        _ => query.to_string(),
    }
}

/// Renders results as labeled context blocks for prompt fusion.
pub fn format_results_as_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Web Result {}: {}]\nURL: {}\nContent: {}\n",
                i + 1,
                r.title,
                r.url,
                r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> WebSearchConfig {
        WebSearchConfig {
            enabled: true,
            ..WebSearchConfig::default()
        }
    }

    #[test]
    fn site_filter_prefixes_query() {
        assert_eq!(
            apply_site_filter("return policy", Some("microcenter.com")),
            "site:microcenter.com return policy"
        );
        assert_eq!(apply_site_filter("return policy", None), "return policy");
        assert_eq!(apply_site_filter("return policy", Some("")), "return policy");
    }

    #[test]
    fn google_requires_key_and_engine_id() {
        let mut config = base_config();
        config.provider = "google".to_string();
        assert!(WebSearchClient::from_config(&config).is_err());

        config.api_key = Some("key".to_string());
        config.engine_id = Some("cx".to_string());
        assert!(WebSearchClient::from_config(&config).is_ok());
    }

    #[test]
    fn duckduckgo_needs_no_credentials() {
        assert!(WebSearchClient::from_config(&base_config()).is_ok());
    }

    #[test]
    fn ddg_topics_flatten_nested_groups() {
        let items = vec![json!({
            "Topics": [
                {"Text": "Return policy - store page", "FirstURL": "https://example.com/returns"},
                {"Text": "", "FirstURL": "https://example.com/skipped"},
            ]
        })];
        let mut results = Vec::new();
        extract_ddg_topics(&items, &mut results);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Return policy");
        assert_eq!(results[0].url, "https://example.com/returns");
    }

    #[test]
    fn formats_results_as_labeled_blocks() {
        let results = vec![
            SearchResult {
                title: "Returns".to_string(),
                url: "https://example.com/a".to_string(),
                snippet: "30 day window".to_string(),
            },
            SearchResult {
                title: "Warranty".to_string(),
                url: "https://example.com/b".to_string(),
                snippet: "1 year coverage".to_string(),
            },
        ];
        let block = format_results_as_context(&results);
        assert!(block.starts_with("[Web Result 1: Returns]\nURL: https://example.com/a\nContent: 30 day window\n"));
        assert!(block.contains("\n---\n[Web Result 2: Warranty]"));
        assert_eq!(format_results_as_context(&[]), "");
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths};
use crate::embedding::HttpEmbeddingProvider;
use crate::llm::build_provider;
use crate::orders::{SqliteOrderStore, SupportAgent};
use crate::rag::{Chunker, FlatIndex, RagPipeline, Retriever};
use crate::tools::search::WebSearchClient;

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Contains references to:
/// - Configuration and paths
/// - The retrieval pipeline (embedder, vector index, chunker, LLM)
/// - The optional web search client
/// - The order store and the customer support agent built on top of it
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub pipeline: Arc<RagPipeline>,
    pub web_search: Option<Arc<WebSearchClient>>,
    pub agent: SupportAgent,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Discovering paths and loading + validating configuration
    /// 2. Connecting the embedding client and opening the vector index
    /// 3. Building the LLM provider and (optionally) the web search client
    /// 4. Opening the order database and seeding it on first run
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths).map_err(InitializationError::Config)?;

        let embedder = Arc::new(
            HttpEmbeddingProvider::new(&config.embedding)
                .map_err(|e| InitializationError::Embedding(e.into()))?,
        );
        let index = Arc::new(FlatIndex::persistent(
            &paths.vector_dir,
            config.embedding.dimension,
            &config.embedding.model,
        ));
        let retriever = Arc::new(Retriever::new(embedder, index));

        let llm =
            build_provider(&config.llm).map_err(|e| InitializationError::Llm(e.into()))?;

        let web_search = if config.web_search.enabled {
            let client = WebSearchClient::from_config(&config.web_search)
                .map_err(|e| InitializationError::Search(e.into()))?;
            Some(Arc::new(client))
        } else {
            None
        };

        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
            .map_err(InitializationError::Config)?;

        let pipeline = Arc::new(RagPipeline::new(
            chunker,
            retriever,
            llm,
            web_search.clone(),
            config.retrieval.top_k,
        ));

        let orders = Arc::new(
            SqliteOrderStore::new(&paths)
                .await
                .map_err(|e| InitializationError::Orders(e.into()))?,
        );
        orders
            .seed_from_file(&paths.orders_seed_path)
            .await
            .map_err(|e| InitializationError::Orders(e.into()))?;

        let agent = SupportAgent::new(orders, pipeline.clone());

        Ok(Arc::new(AppState {
            paths,
            config,
            pipeline,
            web_search,
            agent,
        }))
    }

    /// Directory scanned by auto-ingestion, honoring the config override.
    pub fn documents_dir(&self) -> PathBuf {
        self.config
            .ingest
            .documents_dir
            .clone()
            .unwrap_or_else(|| self.paths.documents_dir.clone())
    }
}

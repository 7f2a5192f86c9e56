use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize web search client: {0}")]
    Search(#[source] anyhow::Error),

    #[error("Failed to initialize order store: {0}")]
    Orders(#[source] anyhow::Error),
}

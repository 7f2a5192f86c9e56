use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use policydesk_backend::core::logging;
use policydesk_backend::rag::documents;
use policydesk_backend::server;
use policydesk_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    tracing::info!(
        "Starting PolicyDesk backend (LLM provider: {}, web search: {})",
        state.config.llm.provider,
        if state.pipeline.web_search_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    if state.config.ingest.auto_load {
        let auto_state = state.clone();
        tokio::spawn(async move {
            let dir = auto_state.documents_dir();
            match documents::ingest_directory(&auto_state.pipeline, &dir).await {
                Ok(report) => tracing::info!(
                    "Auto-loaded {} documents from {} ({} failed)",
                    report.processed,
                    dir.display(),
                    report.failed
                ),
                Err(err) => tracing::warn!("Document auto-load failed: {}", err),
            }
        });
    }

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{evaluate, health, ingest, orders, query};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware
/// - Health and statistics endpoints
/// - Ingestion endpoints (single, batch, directory auto-load, listing)
/// - Query, search, and web-search endpoints
/// - Evaluation and order/agent endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/stats", get(health::stats))
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/ingest/batch", post(ingest::ingest_batch))
        .route("/api/ingest/auto", post(ingest::ingest_auto))
        .route("/api/ingest/list", get(ingest::list))
        .route("/api/query", post(query::query))
        .route("/api/search", post(query::search))
        .route("/api/search/web", post(query::search_web))
        .route("/api/evaluate", post(evaluate::evaluate))
        .route("/api/agent/query", post(orders::agent_query))
        .route("/api/orders/:order_id", get(orders::get_order))
        .route(
            "/api/orders/:order_id/status",
            post(orders::update_order_status),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let configured = state
        .config
        .server
        .allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let allow_origin = if configured.is_empty() {
        AllowOrigin::list(
            default_local_origins()
                .into_iter()
                .filter_map(|origin| HeaderValue::from_str(&origin).ok())
                .collect::<Vec<_>>(),
        )
    } else {
        AllowOrigin::list(configured)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::documents;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    pub documents: Vec<IngestRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutoIngestRequest {
    pub directory: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = payload.source.trim();
    if source.is_empty() {
        return Err(ApiError::BadRequest("source is required".to_string()));
    }
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }

    let receipt = state.pipeline.ingest(&payload.text, source).await?;
    Ok(Json(json!({
        "success": true,
        "document_id": receipt.document_id,
        "chunks_created": receipt.chunks_created,
        "source": source
    })))
}

pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchIngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.documents.is_empty() {
        return Err(ApiError::BadRequest("No documents provided".to_string()));
    }

    let mut results: Vec<Value> = Vec::new();
    let mut errors: Vec<Value> = Vec::new();
    for document in &payload.documents {
        let source = document.source.trim();
        if source.is_empty() {
            continue;
        }
        match state.pipeline.ingest(&document.text, source).await {
            Ok(receipt) => results.push(json!({
                "document_id": receipt.document_id,
                "chunks_created": receipt.chunks_created,
                "source": source
            })),
            Err(err) => errors.push(json!({
                "source": source,
                "error": err.to_string()
            })),
        }
    }

    Ok(Json(json!({
        "success": true,
        "processed": results.len(),
        "failed": errors.len(),
        "results": results,
        "errors": errors
    })))
}

pub async fn ingest_auto(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<AutoIngestRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let directory = request
        .directory
        .map(PathBuf::from)
        .unwrap_or_else(|| state.documents_dir());

    if !directory.exists() {
        return Err(ApiError::BadRequest(format!(
            "Directory does not exist: {}",
            directory.display()
        )));
    }
    if !directory.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Path is not a directory: {}",
            directory.display()
        )));
    }

    let report = documents::ingest_directory(&state.pipeline, &directory).await?;
    Ok(Json(json!({
        "success": true,
        "processed": report.processed,
        "failed": report.failed,
        "total_files_found": report.total_files_found,
        "results": report.results,
        "errors": report.errors
    })))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let directory = params
        .get("directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| state.documents_dir());

    if !directory.exists() {
        return Err(ApiError::BadRequest(format!(
            "Directory does not exist: {}",
            directory.display()
        )));
    }

    let files = documents::list_documents(&directory)?;
    Ok(Json(json!({
        "directory": directory.display().to_string(),
        "total_files": files.len(),
        "files": files
    })))
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::rag::pipeline::RagPipeline;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub filepath: String,
    pub size: u64,
    pub extension: String,
    pub modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestedDocument {
    pub document_id: String,
    pub chunks_created: usize,
    pub filename: String,
    pub filepath: String,
}

#[derive(Debug, Serialize)]
pub struct IngestFailure {
    pub filename: String,
    pub filepath: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchIngestReport {
    pub processed: usize,
    pub failed: usize,
    pub total_files_found: usize,
    pub results: Vec<IngestedDocument>,
    pub errors: Vec<IngestFailure>,
}

fn supported_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reads a document's text. Only plain-text formats are accepted.
pub fn extract_text(path: &Path) -> Result<String, ApiError> {
    if supported_extension(path).is_none() {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("none");
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type: {}",
            ext
        )));
    }
    fs::read_to_string(path).map_err(ApiError::internal)
}

/// Recursively collects supported documents under `dir`, sorted by path so
/// ingestion order is stable across runs.
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let mut found = Vec::new();
    collect_documents(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_documents(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), ApiError> {
    for entry in fs::read_dir(dir).map_err(ApiError::internal)? {
        let path = entry.map_err(ApiError::internal)?.path();
        if path.is_dir() {
            collect_documents(&path, found)?;
        } else if supported_extension(&path).is_some() {
            found.push(path);
        }
    }
    Ok(())
}

/// Lists supported documents with their filesystem metadata.
pub fn list_documents(dir: &Path) -> Result<Vec<DocumentInfo>, ApiError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut infos = Vec::new();
    for path in find_documents(dir)? {
        let metadata = fs::metadata(&path).map_err(ApiError::internal)?;
        let modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
        infos.push(DocumentInfo {
            filename: file_name(&path),
            filepath: path.display().to_string(),
            size: metadata.len(),
            extension: supported_extension(&path).unwrap_or_default(),
            modified,
        });
    }
    Ok(infos)
}

/// Ingests every supported document under `dir`. Per-file failures are
/// recorded in the report instead of aborting the batch.
pub async fn ingest_directory(
    pipeline: &RagPipeline,
    dir: &Path,
) -> Result<BatchIngestReport, ApiError> {
    if !dir.is_dir() {
        return Err(ApiError::NotFound(format!(
            "Documents directory not found: {}",
            dir.display()
        )));
    }

    let files = find_documents(dir)?;
    let mut report = BatchIngestReport {
        processed: 0,
        failed: 0,
        total_files_found: files.len(),
        results: Vec::new(),
        errors: Vec::new(),
    };

    for path in files {
        let filename = file_name(&path);
        let outcome = match extract_text(&path) {
            Ok(text) => pipeline.ingest(&text, &filename).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(receipt) => {
                report.processed += 1;
                report.results.push(IngestedDocument {
                    document_id: receipt.document_id,
                    chunks_created: receipt.chunks_created,
                    filename,
                    filepath: path.display().to_string(),
                });
            }
            Err(err) => {
                warn!("failed to ingest {}: {}", path.display(), err);
                report.failed += 1;
                report.errors.push(IngestFailure {
                    filename,
                    filepath: path.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        "batch ingest: {} processed, {} failed of {} files",
        report.processed, report.failed, report.total_files_found
    );
    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

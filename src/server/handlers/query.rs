use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::PromptTemplate;
use crate::state::AppState;

const PREVIEW_CHARS: usize = 200;

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let question = payload
        .get("question")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Question is required".to_string()))?;
    let top_k = payload
        .get("top_k")
        .and_then(Value::as_u64)
        .map(|v| v as usize);
    let use_web_search = payload
        .get("use_web_search")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let template = payload
        .get("prompt_template")
        .and_then(Value::as_str)
        .map(PromptTemplate::parse)
        .unwrap_or_default();

    let response = state
        .pipeline
        .query(question, top_k, use_web_search, template)
        .await?;

    let retrieved_chunks: Vec<Value> = response
        .retrieved
        .iter()
        .map(|hit| {
            json!({
                "chunk_id": hit.passage.id,
                "text": preview(&hit.passage.text),
                "source": hit.passage.source,
                "score": hit.score
            })
        })
        .collect();

    let mut body = json!({
        "question": question,
        "answer": response.answer.answer,
        "citations": response.answer.citations,
        "retrieved_chunks": retrieved_chunks
    });
    if use_web_search && !response.answer.web_results.is_empty() {
        body["web_results"] = json!(response.answer.web_results);
    }
    Ok(Json(body))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let query_text = payload
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Query is required".to_string()))?;
    let top_k = payload
        .get("top_k")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(state.config.retrieval.top_k);

    let results = state.pipeline.retrieve(query_text, top_k).await?;
    let results: Vec<Value> = results
        .iter()
        .map(|hit| {
            json!({
                "chunk_id": hit.passage.id,
                "text": hit.passage.text,
                "source": hit.passage.source,
                "score": hit.score
            })
        })
        .collect();

    Ok(Json(json!({
        "query": query_text,
        "results": results
    })))
}

pub async fn search_web(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(client) = &state.web_search else {
        return Err(ApiError::BadRequest(
            "Web search is not enabled. Set ENABLE_WEB_SEARCH=true and configure search API keys."
                .to_string(),
        ));
    };

    let query_text = payload
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Query is required".to_string()))?;
    let num_results = payload
        .get("num_results")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(5);
    let site_filter = payload.get("site_filter").and_then(Value::as_str);
    let site_filter = site_filter.or_else(|| client.default_site_filter());

    let results = client.search(query_text, num_results, site_filter).await?;
    Ok(Json(json!({
        "query": query_text,
        "num_results": results.len(),
        "results": results
    })))
}

fn preview(text: &str) -> String {
    let mut end = text.len().min(PREVIEW_CHARS);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

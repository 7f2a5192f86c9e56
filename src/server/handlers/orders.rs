use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::PromptTemplate;
use crate::state::AppState;

pub async fn agent_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("Query is required".to_string()))?;
    let customer_id = payload.get("customer_id").and_then(Value::as_str);
    let template = payload
        .get("prompt_template")
        .and_then(Value::as_str)
        .map(PromptTemplate::parse)
        .unwrap_or_default();

    let response = state.agent.handle_query(query, customer_id, template).await?;
    Ok(Json(response))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state
        .agent
        .order_info(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(Json(json!({
        "success": true,
        "order": info.order,
        "formatted_context": info.formatted_context
    })))
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Status is required".to_string()))?;

    let update = state
        .agent
        .update_order_status(&order_id, status)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(Json(json!({
        "success": true,
        "message": update.message,
        "order": update.order
    })))
}

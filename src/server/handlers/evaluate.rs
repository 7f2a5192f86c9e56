use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::eval::{Evaluator, TestCase};
use crate::state::AppState;

pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let cases: Option<Vec<TestCase>> = payload
        .as_ref()
        .and_then(|Json(body)| body.get("test_questions"))
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| ApiError::BadRequest(format!("invalid test_questions: {}", err)))?;

    let report = Evaluator::new(state.pipeline.clone()).evaluate(cases).await?;
    Ok(Json(report))
}

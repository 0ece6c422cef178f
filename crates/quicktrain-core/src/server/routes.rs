//! Request handlers.

use super::error::{ApiError, ApiResult};
use axum::{body::Bytes, extract::State, Json};
use quicktrain_orchestrator::{Acknowledgement, JobDispatcher};
use quicktrain_training::TrainingRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// `POST /trigger-training`
///
/// The body is parsed by hand so malformed JSON gets the same `{error}` shape as
/// every other rejection.
pub async fn trigger_training(
    State(dispatcher): State<Arc<JobDispatcher>>,
    body: Bytes,
) -> ApiResult<Json<Acknowledgement>> {
    let request: TrainingRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    debug!(job_id = ?request.job_id(), model_type = ?request.model_type(), "Training request received");
    Ok(Json(dispatcher.dispatch(&request)?))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::extractors::AppJson;
use crate::handlers::ApiError;
use crate::models::sprint::{CompleteTaskRequest, CreateTaskRequest, TaskView};
use crate::services::AppState;

/// POST /api/v1/tasks - Create a one-off practice task
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("Creating task for user_id={}", req.user_id);

    let orchestrator = state.orchestrator();
    match orchestrator.create_task(&req.user_id, &req.content).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(TaskView::from_record(&record)))),
        Err(e) => {
            tracing::error!("Failed to create task for {}: {}", req.user_id, e);
            Err(e.into())
        }
    }
}

/// POST /api/v1/tasks/{task_id}/complete - Mark the task done and claim XP
pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    AppJson(req): AppJson<CompleteTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("Completing task {} for user_id={}", task_id, req.user_id);

    let orchestrator = state.orchestrator();
    match orchestrator.complete_task(&req.user_id, &task_id).await {
        Ok(reward) => Ok((StatusCode::OK, Json(reward))),
        Err(e) => {
            tracing::error!("Failed to complete task {}: {}", task_id, e);
            Err(e.into())
        }
    }
}

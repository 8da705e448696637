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
use crate::models::session::SprintOutcome;
use crate::models::sprint::{CompleteSprintRequest, SprintView, StartSprintRequest};
use crate::services::AppState;

/// POST /api/v1/sprints - Start (or resume) today's sprint
pub async fn start_sprint(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartSprintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!(
        "Starting sprint for user_id={}, topic={}",
        req.user_id,
        req.topic.as_deref().unwrap_or("<default>")
    );

    let orchestrator = state.orchestrator();
    match orchestrator
        .start_sprint(&req.user_id, req.topic.as_deref(), req.difficulty)
        .await
    {
        Ok(session) => Ok((
            StatusCode::CREATED,
            Json(SprintView::from_session(&session)),
        )),
        Err(e) => {
            tracing::error!("Failed to start sprint for {}: {}", req.user_id, e);
            Err(e.into())
        }
    }
}

/// POST /api/v1/sprints/{sprint_id}/complete - Close the sprint and claim XP
pub async fn complete_sprint(
    State(state): State<Arc<AppState>>,
    Path(sprint_id): Path<String>,
    AppJson(req): AppJson<CompleteSprintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!(
        "Completing sprint {} for user_id={}",
        sprint_id,
        req.user_id
    );

    let outcome = SprintOutcome {
        questions_correct: req.questions_correct,
        total_questions: req.total_questions,
        combo_max: req.combo_max,
    };

    let orchestrator = state.orchestrator();
    match orchestrator
        .complete_sprint(&req.user_id, &sprint_id, outcome)
        .await
    {
        Ok(reward) => Ok((StatusCode::OK, Json(reward))),
        Err(e) => {
            tracing::error!("Failed to complete sprint {}: {}", sprint_id, e);
            Err(e.into())
        }
    }
}

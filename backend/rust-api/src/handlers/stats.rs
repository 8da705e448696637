use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::models::stats::StatsView;
use crate::services::AppState;

/// GET /api/v1/stats/{user_id} - Current XP, level, streak and best combo
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Fetching stats for user_id={}", user_id);

    let orchestrator = state.orchestrator();
    match orchestrator.user_stats(&user_id).await {
        Ok(record) => Ok((StatusCode::OK, Json(StatsView::from_record(&record)))),
        Err(e) => {
            tracing::error!("Failed to fetch stats for {}: {}", user_id, e);
            Err(e.into())
        }
    }
}

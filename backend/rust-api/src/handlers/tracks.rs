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
use crate::models::sprint::SynthesizeTrackRequest;
use crate::models::track::{TrackCreatedResponse, TrackView};
use crate::services::AppState;

/// POST /api/v1/tracks - Synthesize a full course track for a topic
pub async fn synthesize_track(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SynthesizeTrackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!("Synthesizing track for topic={}", req.topic);

    let orchestrator = state.orchestrator();
    match orchestrator.synthesize_track(&req.topic).await {
        Ok(track) => Ok((
            StatusCode::CREATED,
            Json(TrackCreatedResponse::from_record(&track)),
        )),
        Err(e) => {
            tracing::error!("Failed to synthesize track for '{}': {}", req.topic, e);
            Err(e.into())
        }
    }
}

/// GET /api/v1/tracks/{track_id} - Fetch a track with its lessons and questions
pub async fn get_track(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Fetching track {}", track_id);

    let orchestrator = state.orchestrator();
    match orchestrator.track(&track_id).await {
        Ok(bundle) => Ok((StatusCode::OK, Json(TrackView::from_bundle(&bundle)))),
        Err(e) => {
            tracing::error!("Failed to fetch track {}: {}", track_id, e);
            Err(e.into())
        }
    }
}

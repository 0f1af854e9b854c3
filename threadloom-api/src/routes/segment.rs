//! Ungoverned segmentation endpoint.

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use threadloom_core::Segment;
use threadloom_segment::{segment_with, SegmentOptions};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::validate_options;

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentRequest {
    pub text: String,
    pub max_length: usize,
    #[serde(default)]
    pub numbered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentResponse {
    pub segments: Vec<Segment>,
    pub total: usize,
}

/// POST /api/v1/segment - split text without touching quota or cache.
pub async fn segment_text(
    State(state): State<AppState>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> ApiResult<Json<SegmentResponse>> {
    let Json(request) = payload?;
    if request.text.len() > state.config.max_text_bytes {
        return Err(ApiError::payload_too_large("text", state.config.max_text_bytes));
    }

    let options =
        validate_options(SegmentOptions::new(request.max_length).with_numbering(request.numbered))?;
    let segments = segment_with(&request.text, &options)?;

    Ok(Json(SegmentResponse {
        total: segments.len(),
        segments,
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/segment", post(segment_text))
}

//! Thread generation endpoint.
//!
//! `POST /api/v1/threads` is the one governed call: every request is
//! admitted by the facade before anything is generated.

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use threadloom_core::{normalize_whitespace, ContentSource, Fingerprint, Segment, ValidationError};
use threadloom_governance::{AdmissionResult, DecisionReason};
use threadloom_segment::SegmentOptions;

use crate::error::{ApiError, ApiResult};
use crate::identity::CallerIdentity;
use crate::state::AppState;
use crate::telemetry::with_metrics;

use super::validate_options;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadRequest {
    pub text: String,
    /// Falls back to the configured default post length.
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub numbered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadResponse {
    pub segments: Vec<Segment>,
    pub fingerprint: Fingerprint,
    /// The segments came from the cache rather than this request.
    pub cached: bool,
    pub reason: DecisionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<AdmissionResult>,
    pub degraded: bool,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/v1/threads
pub async fn create_thread(
    State(state): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    payload: Result<Json<ThreadRequest>, JsonRejection>,
) -> ApiResult<Json<ThreadResponse>> {
    let Json(request) = payload?;

    // Reject bad input before it can consume quota.
    if request.text.len() > state.config.max_text_bytes {
        return Err(ApiError::payload_too_large("text", state.config.max_text_bytes));
    }
    if normalize_whitespace(&request.text).is_empty() {
        return Err(ValidationError::EmptyText.into());
    }
    let max_length = request
        .max_length
        .unwrap_or(state.facade.config().default_max_length);
    let options = validate_options(SegmentOptions::new(max_length).with_numbering(request.numbered))?;

    let fingerprint = Fingerprint::for_source(
        &ContentSource::Text(request.text.clone()),
        options.max_length,
        options.numbered,
    );

    let decision = state.facade.admit(&identity, &fingerprint).await;
    with_metrics(|metrics| {
        metrics.record_admission(decision.reason.as_str());
        metrics.set_store_available(state.facade.store().is_available());
    });

    if !decision.proceed {
        let details = serde_json::to_value(decision.usage)?;
        return Err(ApiError::limit_exceeded(details));
    }

    if let Some(entry) = decision.cached {
        return Ok(Json(ThreadResponse {
            segments: entry.payload,
            fingerprint,
            cached: true,
            reason: decision.reason,
            usage: None,
            degraded: decision.degraded,
        }));
    }

    let generator = state.generator.clone();
    let fill = state
        .facade
        .cache()
        .get_or_generate(&fingerprint, || async move {
            generator.generate(&request.text, &options).await
        })
        .await?;

    tracing::debug!(
        identity = %identity,
        fingerprint = %fingerprint,
        generator = state.generator.name(),
        segments = fill.entry.payload.len(),
        coalesced = fill.hit,
        "Thread generated"
    );

    Ok(Json(ThreadResponse {
        segments: fill.entry.payload,
        fingerprint,
        cached: fill.hit,
        reason: decision.reason,
        usage: decision.usage,
        degraded: decision.degraded,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/threads", post(create_thread))
}

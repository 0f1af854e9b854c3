//! REST API Route Handlers
//!
//! - `threads`: governed thread generation
//! - `segment`: plain segmentation
//! - `usage`: caller counts and premium status
//! - `webhooks`: payment provider callbacks
//! - `health`: liveness and readiness probes

pub mod health;
pub mod segment;
pub mod threads;
pub mod usage;
pub mod webhooks;

use axum::Router;
use threadloom_core::{ValidationError, MIN_MAX_LENGTH};
use threadloom_segment::SegmentOptions;

use crate::state::AppState;

/// Routes mounted under `/api/v1`.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(threads::create_router())
        .merge(segment::create_router())
        .merge(usage::create_router())
        .merge(webhooks::create_router())
}

/// Reject post lengths too short to carry any text.
pub(crate) fn validate_options(options: SegmentOptions) -> Result<SegmentOptions, ValidationError> {
    if options.max_length < MIN_MAX_LENGTH {
        return Err(ValidationError::InvalidMaxLength {
            max_length: options.max_length,
            minimum: MIN_MAX_LENGTH,
        });
    }
    Ok(options)
}

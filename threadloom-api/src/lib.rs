//! Threadloom API - HTTP Surface
//!
//! Thin axum layer over [`threadloom_governance::GovernanceFacade`]:
//!
//! - `POST /api/v1/threads` - governed thread generation
//! - `POST /api/v1/segment` - plain segmentation
//! - `GET  /api/v1/usage` - caller counts and premium status
//! - `POST /api/v1/webhooks/payment` - signed payment callbacks
//! - `GET  /health/{ping,live,ready}` and `GET /metrics`

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod generator;
pub mod identity;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use generator::{SegmentingGenerator, ThreadGenerator};
pub use identity::{resolve_identity, CallerIdentity};
pub use state::{connect_store, AppState};

use telemetry::{metrics_handler, observability_middleware, TelemetryConfig};

/// Build the full application router.
pub fn create_router(state: AppState, telemetry: &TelemetryConfig) -> Router {
    let body_limit = state.config.body_limit();
    let request_timeout = state.config.request_timeout;

    let mut router = Router::new()
        .nest("/api/v1", routes::create_api_router())
        .nest("/health", routes::health::create_router());

    if telemetry.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

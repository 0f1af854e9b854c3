//! Prometheus Metrics Definitions
//!
//! Defines all Threadloom metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<ThreadloomMetrics>> = Lazy::new(ThreadloomMetrics::new);

/// Container for all Threadloom metrics.
#[derive(Clone)]
pub struct ThreadloomMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Admission decisions - labels: reason
    pub admissions_total: CounterVec,

    /// Payment grants - labels: outcome (applied/duplicate/failed)
    pub grants_total: CounterVec,

    /// 1 while the shared store answers, 0 while degraded
    pub store_available: Gauge,
}

impl ThreadloomMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "threadloom_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "threadloom_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            admissions_total: register_counter_vec!(
                "threadloom_admissions_total",
                "Admission decisions by reason",
                &["reason"]
            )
            .map_err(|e| registration_error("admissions_total", e))?,

            grants_total: register_counter_vec!(
                "threadloom_grants_total",
                "Entitlement grants by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("grants_total", e))?,

            store_available: register_gauge!(
                "threadloom_store_available",
                "Whether the shared store answered its last call"
            )
            .map_err(|e| registration_error("store_available", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_admission(&self, reason: &str) {
        self.admissions_total.with_label_values(&[reason]).inc();
    }

    pub fn record_grant(&self, outcome: &str) {
        self.grants_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_store_available(&self, available: bool) {
        self.store_available.set(if available { 1.0 } else { 0.0 });
    }
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

/// Run `f` against the global metrics, if they registered.
pub fn with_metrics(f: impl FnOnce(&ThreadloomMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    if let Err(e) = METRICS.as_ref() {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.message.clone());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Metrics are not valid UTF-8: {}", e),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

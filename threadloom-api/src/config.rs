//! API Configuration Module
//!
//! Bind address, store backend selection, webhook secret, and request
//! limits for the HTTP surface. Loaded once from environment variables
//! with defaults suitable for local development.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Which key-value store backs the governance engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis instance; required when running more than one process.
    Redis,
    /// Process-local map. Counts and grants are lost on restart.
    Memory,
}

impl StoreBackend {
    fn parse(raw: &str) -> ApiResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ApiError::invalid_input(format!(
                "Invalid THREADLOOM_STORE value '{}': expected 'redis' or 'memory'",
                other
            ))),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Listener
    // ========================================================================
    pub bind_host: String,
    pub port: u16,

    // ========================================================================
    // Store
    // ========================================================================
    pub store_backend: StoreBackend,
    pub redis_url: String,
    /// Upper bound on establishing the Redis connection at start-up.
    pub redis_connect_timeout: Duration,

    // ========================================================================
    // Payment webhook
    // ========================================================================
    /// Shared secret for `X-Signature`. Webhooks are refused while unset.
    pub webhook_secret: Option<String>,

    // ========================================================================
    // Request limits
    // ========================================================================
    pub request_timeout: Duration,
    /// Largest `text` accepted by the thread and segment endpoints.
    pub max_text_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            store_backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            redis_connect_timeout: Duration::from_secs(2),
            webhook_secret: None,
            request_timeout: Duration::from_secs(30),
            max_text_bytes: 64 * 1024,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `THREADLOOM_API_BIND`: Listen host (default: 0.0.0.0)
    /// - `PORT` or `THREADLOOM_API_PORT`: Listen port (default: 3000)
    /// - `THREADLOOM_STORE`: "redis" or "memory" (default: redis)
    /// - `THREADLOOM_REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379/)
    /// - `THREADLOOM_REDIS_CONNECT_TIMEOUT_MS` (default: 2000)
    /// - `THREADLOOM_WEBHOOK_SECRET`: Payment webhook signing secret
    /// - `THREADLOOM_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `THREADLOOM_MAX_TEXT_BYTES` (default: 65536)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("THREADLOOM_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        let store_backend = match lookup("THREADLOOM_STORE") {
            Some(raw) => StoreBackend::parse(&raw)?,
            None => defaults.store_backend,
        };

        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Ok(Self {
            bind_host: lookup("THREADLOOM_API_BIND").unwrap_or(defaults.bind_host),
            port,
            store_backend,
            redis_url: lookup("THREADLOOM_REDIS_URL").unwrap_or(defaults.redis_url),
            redis_connect_timeout: parse("THREADLOOM_REDIS_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redis_connect_timeout),
            webhook_secret: lookup("THREADLOOM_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            request_timeout: parse("THREADLOOM_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_text_bytes: parse("THREADLOOM_MAX_TEXT_BYTES")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_text_bytes),
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }

    /// Request body limit: the text budget plus room for the JSON envelope.
    pub fn body_limit(&self) -> usize {
        self.max_text_bytes.saturating_add(4 * 1024)
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_store_backend(mut self, backend: StoreBackend) -> Self {
        self.store_backend = backend;
        self
    }

    pub fn with_max_text_bytes(mut self, max: usize) -> Self {
        self.max_text_bytes = max;
        self
    }
}

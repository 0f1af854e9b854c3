//! Shared application state for Axum handlers.

use std::sync::Arc;
use std::time::Instant;

use threadloom_core::{Clock, GovernanceConfig};
use threadloom_governance::GovernanceFacade;
use threadloom_storage::{InMemoryStore, KeyValueStore, RedisStore};

use crate::config::{ApiConfig, StoreBackend};
use crate::error::{ApiError, ApiResult};
use crate::generator::ThreadGenerator;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<GovernanceFacade>,
    pub generator: Arc<dyn ThreadGenerator>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        facade: Arc<GovernanceFacade>,
        generator: Arc<dyn ThreadGenerator>,
        config: ApiConfig,
    ) -> Self {
        Self {
            facade,
            generator,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Connect the configured store backend and build the facade over it.
    pub async fn connect(
        governance: GovernanceConfig,
        config: ApiConfig,
        generator: Arc<dyn ThreadGenerator>,
        clock: Arc<dyn Clock>,
    ) -> ApiResult<Self> {
        let backend = connect_store(&config, clock.clone()).await?;
        let facade = Arc::new(GovernanceFacade::with_backend(governance, backend, clock));
        Ok(Self::new(facade, generator, config))
    }
}

/// Open the key-value store selected by `config`.
///
/// An unreachable Redis fails start-up; once connected, outages are
/// absorbed by the degradable client.
pub async fn connect_store(
    config: &ApiConfig,
    clock: Arc<dyn Clock>,
) -> ApiResult<Arc<dyn KeyValueStore>> {
    match config.store_backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url, config.redis_connect_timeout)
                .await
                .map_err(|e| {
                    ApiError::service_unavailable(format!("Failed to connect to Redis: {}", e))
                })?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; usage and grants are not shared or durable");
            Ok(Arc::new(InMemoryStore::new(clock)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SegmentingGenerator;
    use threadloom_core::SystemClock;

    #[tokio::test]
    async fn test_memory_backend_connects() -> ApiResult<()> {
        let config = ApiConfig::default().with_store_backend(StoreBackend::Memory);
        let state = AppState::connect(
            GovernanceConfig::default(),
            config,
            Arc::new(SegmentingGenerator),
            Arc::new(SystemClock),
        )
        .await?;

        assert_eq!(state.facade.store().backend_name(), "memory");
        assert!(state.facade.store_available().await);
        Ok(())
    }
}

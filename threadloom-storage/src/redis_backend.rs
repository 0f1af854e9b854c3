//! # Redis
//!
//! Shared key-expiring store used in production.
//!
//! ## Implementation
//!
//! - One multiplexed `ConnectionManager` per process; it reconnects on its own
//!   and is cheap to clone per call
//! - Counters are plain integer keys; increment-and-expire runs as one Lua
//!   script so the window TTL is set exactly once, when the key is created
//! - Grant sentinels use `SET NX PX`, which is atomic on the server
//! - Connection setup is bounded so a missing Redis never stalls start-up for long

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client, RedisError, Script,
};
use threadloom_core::StoreError;

use crate::kv::KeyValueStore;

static INCR_WITH_TTL: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) == -1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
",
    )
});

/// Redis-backed [`KeyValueStore`].
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis_url`, giving up after `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(connect_timeout);

        let client = Client::open(redis_url).map_err(map_redis_error)?;
        let connection = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(map_redis_error)?;

        tracing::info!("Connected to Redis store");
        Ok(Self { connection })
    }

    fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout {
            operation: "redis".to_string(),
            after: Duration::ZERO,
        }
    } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        StoreError::Connection {
            reason: err.to_string(),
        }
    } else {
        StoreError::Backend {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection();
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(map_redis_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.connection();
        INCR_WITH_TTL
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection();
        let removed: i64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

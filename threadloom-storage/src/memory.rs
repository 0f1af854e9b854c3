//! In-process key-value store.
//!
//! Used when no shared store is configured and throughout the test suite.
//! Expiry is evaluated against an injected [`Clock`], so tests can jump past
//! window boundaries and entitlement expiry. Fault injection
//! ([`set_offline`](InMemoryStore::set_offline),
//! [`set_latency`](InMemoryStore::set_latency)) lets tests drive every
//! degraded-mode policy without a real outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use threadloom_core::{Clock, StoreError, SystemClock, Timestamp};

use crate::kv::KeyValueStore;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Timestamp>,
}

impl StoredValue {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Mutex-guarded map of values with optional expiry.
#[derive(Debug)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryStore {
    /// Create an empty store that reads time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent operation fail with [`StoreError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .map(|entries| entries.values().filter(|v| v.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired keys. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        match self.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, v| v.is_live(now));
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    /// Expiry of a live key, if it has one.
    pub fn expires_at(&self, key: &str) -> Option<Timestamp> {
        let now = self.clock.now();
        self.lock()
            .ok()?
            .get(key)
            .filter(|v| v.is_live(now))
            .and_then(|v| v.expires_at)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredValue>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Backend {
            reason: "in-memory store lock poisoned".to_string(),
        })
    }

    /// Apply configured latency, then fail if offline.
    async fn admit(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        Ok(())
    }

    fn expiry(&self, ttl: Duration) -> Option<Timestamp> {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        self.clock.now().checked_add_signed(ttl)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.admit().await?;
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.admit().await?;
        let expires_at = self.expiry(ttl);
        self.lock()?.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.admit().await?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|v| v.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.admit().await?;
        let now = self.clock.now();
        let fresh_expiry = self.expiry(ttl);
        let mut entries = self.lock()?;

        let (count, expires_at) = match entries.get(key).filter(|v| v.is_live(now)) {
            Some(existing) => {
                let current: i64 = existing.value.parse().map_err(|_| StoreError::Backend {
                    reason: format!("value at {} is not an integer", key),
                })?;
                let next = current.checked_add(1).ok_or_else(|| StoreError::Backend {
                    reason: format!("increment would overflow at {}", key),
                })?;
                (next, existing.expires_at.or(fresh_expiry))
            }
            None => (1, fresh_expiry),
        };

        entries.insert(
            key.to_string(),
            StoredValue {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.admit().await?;
        let now = self.clock.now();
        Ok(self
            .lock()?
            .remove(key)
            .is_some_and(|v| v.is_live(now)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.admit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadloom_core::ManualClock;

    fn store_with_clock() -> (InMemoryStore, ManualClock) {
        let clock = ManualClock::at(2024, 5, 10, 12, 0, 0);
        (InMemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() -> Result<(), StoreError> {
        let (store, _) = store_with_clock();
        store.set_with_ttl("k", "v", Duration::from_secs(10)).await?;
        assert_eq!(store.get("k").await?, Some("v".to_string()));
        assert_eq!(store.get("missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_values_expire_with_clock() -> Result<(), StoreError> {
        let (store, clock) = store_with_clock();
        store.set_with_ttl("k", "v", Duration::from_secs(10)).await?;
        clock.advance(Duration::from_secs(9));
        assert!(store.get("k").await?.is_some());
        clock.advance(Duration::from_secs(1));
        assert!(store.get("k").await?.is_none());
        assert_eq!(store.purge_expired(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_incr_sets_ttl_only_on_create() -> Result<(), StoreError> {
        let (store, clock) = store_with_clock();
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await?, 1);
        let first_expiry = store.expires_at("c");

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await?, 2);
        assert_eq!(store.expires_at("c"), first_expiry);

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() -> Result<(), StoreError> {
        let (store, _) = store_with_clock();
        store.set_with_ttl("k", "abc", Duration::from_secs(10)).await?;
        assert!(matches!(
            store.incr_with_ttl("k", Duration::from_secs(10)).await,
            Err(StoreError::Backend { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_if_absent() -> Result<(), StoreError> {
        let (store, clock) = store_with_clock();
        assert!(store.set_if_absent("g", "1", Duration::from_secs(5)).await?);
        assert!(!store.set_if_absent("g", "2", Duration::from_secs(5)).await?);
        assert_eq!(store.get("g").await?, Some("1".to_string()));

        clock.advance(Duration::from_secs(5));
        assert!(store.set_if_absent("g", "3", Duration::from_secs(5)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete() -> Result<(), StoreError> {
        let (store, _) = store_with_clock();
        store.set_with_ttl("k", "v", Duration::from_secs(10)).await?;
        assert!(store.delete("k").await?);
        assert!(!store.delete("k").await?);
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_fails_every_operation() {
        let (store, _) = store_with_clock();
        store.set_offline(true);
        assert_eq!(store.get("k").await, Err(StoreError::Offline));
        assert_eq!(store.ping().await, Err(StoreError::Offline));
        assert_eq!(
            store.incr_with_ttl("k", Duration::from_secs(1)).await,
            Err(StoreError::Offline)
        );

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}

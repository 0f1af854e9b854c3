//! Degradable store client.
//!
//! Every store call is bounded by the configured timeout and converted from
//! `Result<_, StoreError>` into a tri-state outcome. Callers match on
//! `Unavailable` and apply their own policy (fail-open, fail-closed, miss);
//! a store failure never surfaces as an error past this point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use threadloom_core::StoreError;

use crate::kv::KeyValueStore;

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRead {
    Found(String),
    Missing,
    Unavailable,
}

/// Result of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCount {
    Counted(i64),
    Unavailable,
}

/// Result of an unconditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    Written,
    Unavailable,
}

/// Result of a write-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreClaim {
    /// The key was absent and now holds our value.
    Claimed,
    /// Another writer got there first.
    AlreadyClaimed,
    Unavailable,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDelete {
    Removed,
    Absent,
    Unavailable,
}

impl StoreWrite {
    pub fn is_written(self) -> bool {
        matches!(self, StoreWrite::Written)
    }
}

/// Timeout-bounded wrapper around a [`KeyValueStore`].
///
/// Tracks whether the most recent call succeeded so health checks and the
/// availability gauge can report degraded mode. Transitions are logged once
/// each way rather than on every failed call.
pub struct DegradableStoreClient {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
    available: AtomicBool,
    failures: AtomicU64,
}

impl std::fmt::Debug for DegradableStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradableStoreClient")
            .field("backend", &self.store.backend_name())
            .field("timeout", &self.timeout)
            .field("available", &self.is_available())
            .field("failures", &self.failure_count())
            .finish()
    }
}

impl DegradableStoreClient {
    /// Wrap `store`, bounding every call by `timeout`.
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            available: AtomicBool::new(true),
            failures: AtomicU64::new(0),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the most recent store call succeeded.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Total failed or timed-out calls since start-up.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> StoreRead {
        match self.attempt("get", key, self.store.get(key)).await {
            Some(Some(value)) => StoreRead::Found(value),
            Some(None) => StoreRead::Missing,
            None => StoreRead::Unavailable,
        }
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreWrite {
        match self
            .attempt("set", key, self.store.set_with_ttl(key, value, ttl))
            .await
        {
            Some(()) => StoreWrite::Written,
            None => StoreWrite::Unavailable,
        }
    }

    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreClaim {
        match self
            .attempt("set_if_absent", key, self.store.set_if_absent(key, value, ttl))
            .await
        {
            Some(true) => StoreClaim::Claimed,
            Some(false) => StoreClaim::AlreadyClaimed,
            None => StoreClaim::Unavailable,
        }
    }

    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreCount {
        match self
            .attempt("incr", key, self.store.incr_with_ttl(key, ttl))
            .await
        {
            Some(count) => StoreCount::Counted(count),
            None => StoreCount::Unavailable,
        }
    }

    pub async fn delete(&self, key: &str) -> StoreDelete {
        match self.attempt("delete", key, self.store.delete(key)).await {
            Some(true) => StoreDelete::Removed,
            Some(false) => StoreDelete::Absent,
            None => StoreDelete::Unavailable,
        }
    }

    /// Probe the backend. Also refreshes the availability flag.
    pub async fn ping(&self) -> bool {
        self.attempt("ping", "", self.store.ping()).await.is_some()
    }

    async fn attempt<T, F>(&self, operation: &'static str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }),
        };

        match result {
            Ok(value) => {
                self.mark_available();
                Some(value)
            }
            Err(err) => {
                self.mark_unavailable(operation, key, &err);
                None
            }
        }
    }

    fn mark_available(&self) {
        if !self.available.swap(true, Ordering::SeqCst) {
            tracing::info!(backend = self.backend_name(), "Store available again");
        }
    }

    fn mark_unavailable(&self, operation: &'static str, key: &str, err: &StoreError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        if self.available.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                backend = self.backend_name(),
                operation,
                key,
                error = %err,
                "Store unavailable, entering degraded mode"
            );
        } else {
            tracing::debug!(operation, key, error = %err, "Store call failed while degraded");
        }
    }
}

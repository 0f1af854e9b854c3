//! Key-value store contract.
//!
//! The shared, key-expiring store (Redis in production) is used only through
//! this trait. Implementations report failures as [`StoreError`]; callers
//! outside this crate go through [`DegradableStoreClient`], which turns those
//! failures into explicit "unavailable" outcomes.
//!
//! [`DegradableStoreClient`]: crate::DegradableStoreClient

use std::time::Duration;

use async_trait::async_trait;
use threadloom_core::StoreError;

/// Pluggable key-value backend with per-key expiry.
///
/// Implementations must be safe for concurrent use from many tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Read a value. `Ok(None)` means the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires after `ttl`, replacing any previous value.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write a value only if the key is absent. Returns whether it was written.
    ///
    /// The check and the write are a single atomic step.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Atomically increment an integer counter and return the new value.
    ///
    /// `ttl` is applied only when the increment creates the key (or the key
    /// somehow has no expiry); later increments leave the expiry untouched.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}

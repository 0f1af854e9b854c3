//! Threadloom Storage - Store Access and Content Cache
//!
//! Everything that touches the shared key-value store lives here:
//!
//! - [`KeyValueStore`]: the backend contract, with [`RedisStore`] for
//!   production and [`InMemoryStore`] for single-process runs and tests
//! - [`DegradableStoreClient`]: timeout-bounded access that reports
//!   failures as explicit `Unavailable` outcomes
//! - [`keys`]: the key layout shared by every component
//! - [`ContentCache`]: fingerprint-keyed cache of generated threads

pub mod cache;
pub mod degradable;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod redis_backend;

pub use cache::{CacheFill, CacheLookup, CacheStats, ContentCache};
pub use degradable::{
    DegradableStoreClient, StoreClaim, StoreCount, StoreDelete, StoreRead, StoreWrite,
};
pub use kv::KeyValueStore;
pub use memory::InMemoryStore;
pub use redis_backend::RedisStore;

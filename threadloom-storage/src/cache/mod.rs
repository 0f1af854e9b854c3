//! Content cache.
//!
//! Generated post sequences are stored under their request fingerprint so a
//! repeated request is served without regenerating and without consuming the
//! caller's free quota. The cache is strictly best-effort: an unreachable
//! store reads as a miss and a failed write is dropped.

pub mod content_cache;

pub use content_cache::{CacheFill, CacheLookup, CacheStats, ContentCache};

//! Fingerprint-keyed cache of generated post sequences.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use threadloom_core::{CacheEntry, Clock, Fingerprint, Segment};
use tokio::sync::Mutex;

use crate::degradable::{DegradableStoreClient, StoreDelete, StoreRead, StoreWrite};
use crate::keys;

/// Outcome of a cache lookup.
///
/// A store outage is indistinguishable from a miss here; the caller simply
/// regenerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss => None,
        }
    }
}

/// Result of [`ContentCache::get_or_generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFill {
    pub entry: CacheEntry,
    /// True when this call did not run the generator itself.
    pub hit: bool,
}

/// Counters for cache usage since start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    /// Stored payloads that failed to decode or validate.
    pub corrupt_entries: u64,
    /// Fingerprints with a generation currently running in this process.
    pub in_flight: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    corrupt_entries: AtomicU64,
}

/// Gate shared by concurrent generations of one fingerprint. Holds the last
/// produced entry so waiters are served even when the store is down.
type FlightGate = Arc<Mutex<Option<CacheEntry>>>;

/// One caller's hold on a flight gate. Dropping it, including when the
/// caller's future is cancelled mid-fill, removes the gate once no other
/// caller holds it.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<Fingerprint, FlightGate>,
    fingerprint: Fingerprint,
    gate: Option<FlightGate>,
}

impl<'a> FlightGuard<'a> {
    fn join(in_flight: &'a DashMap<Fingerprint, FlightGate>, fingerprint: &Fingerprint) -> Self {
        let gate = in_flight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        Self {
            in_flight,
            fingerprint: fingerprint.clone(),
            gate: Some(gate),
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.gate.take();
        self.in_flight
            .remove_if(&self.fingerprint, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// Content cache over the degradable store.
///
/// Entries are immutable per fingerprint and expire after their TTL.
/// Corrupt or mismatched entries are treated as misses and removed.
#[derive(Debug)]
pub struct ContentCache {
    store: Arc<DegradableStoreClient>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    in_flight: DashMap<Fingerprint, FlightGate>,
    counters: Counters,
}

impl ContentCache {
    pub fn new(
        store: Arc<DegradableStoreClient>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            default_ttl,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a previously generated sequence.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> CacheLookup {
        let lookup = self.fetch(fingerprint).await;
        self.count_lookup(&lookup);
        lookup
    }

    /// Store a sequence under `fingerprint` for `ttl`. Best-effort: returns
    /// whether the write landed, and never fails the caller.
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        payload: Vec<Segment>,
        ttl: Duration,
    ) -> bool {
        let entry = CacheEntry::new(fingerprint.clone(), payload, self.clock.now());
        self.write(&entry, ttl).await
    }

    /// [`store`](Self::store) with the configured TTL.
    pub async fn store_default(&self, fingerprint: &Fingerprint, payload: Vec<Segment>) -> bool {
        self.store(fingerprint, payload, self.default_ttl).await
    }

    /// Return the cached sequence, or run `generate` once and cache its output.
    ///
    /// Concurrent calls for one fingerprint in this process are coalesced:
    /// the first runs the generator, the rest wait and take its result.
    /// Generator errors are returned as-is and nothing is cached.
    pub async fn get_or_generate<F, Fut, E>(
        &self,
        fingerprint: &Fingerprint,
        generate: F,
    ) -> Result<CacheFill, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Segment>, E>>,
    {
        if let CacheLookup::Hit(entry) = self.fetch(fingerprint).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheFill { entry, hit: true });
        }

        let guard = FlightGuard::join(&self.in_flight, fingerprint);
        let unshared = Mutex::new(None);
        let gate = guard.gate.as_deref().unwrap_or(&unshared);
        let result = self.fill_under_gate(fingerprint, gate, generate).await;
        result
    }

    async fn fill_under_gate<F, Fut, E>(
        &self,
        fingerprint: &Fingerprint,
        gate: &Mutex<Option<CacheEntry>>,
        generate: F,
    ) -> Result<CacheFill, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Segment>, E>>,
    {
        let mut slot = gate.lock().await;
        if let Some(entry) = slot.as_ref() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheFill {
                entry: entry.clone(),
                hit: true,
            });
        }

        let lookup = self.fetch(fingerprint).await;
        self.count_lookup(&lookup);
        if let CacheLookup::Hit(entry) = lookup {
            return Ok(CacheFill { entry, hit: true });
        }

        let payload = generate().await?;
        let entry = CacheEntry::new(fingerprint.clone(), payload, self.clock.now());
        self.write(&entry, self.default_ttl).await;
        *slot = Some(entry.clone());
        Ok(CacheFill { entry, hit: false })
    }

    /// Remove a cached sequence. Returns whether one was removed.
    pub async fn purge(&self, fingerprint: &Fingerprint) -> bool {
        matches!(
            self.store.delete(&keys::cache(fingerprint)).await,
            StoreDelete::Removed
        )
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            corrupt_entries: self.counters.corrupt_entries.load(Ordering::Relaxed),
            in_flight: self.in_flight.len() as u64,
        }
    }

    fn count_lookup(&self, lookup: &CacheLookup) {
        let counter = if lookup.is_hit() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    async fn fetch(&self, fingerprint: &Fingerprint) -> CacheLookup {
        let key = keys::cache(fingerprint);
        let raw = match self.store.get(&key).await {
            StoreRead::Found(raw) => raw,
            StoreRead::Missing => return CacheLookup::Miss,
            StoreRead::Unavailable => {
                tracing::debug!(fingerprint = %fingerprint, "Cache read skipped, store unavailable");
                return CacheLookup::Miss;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.fingerprint == *fingerprint && entry.is_well_formed() => {
                CacheLookup::Hit(entry)
            }
            Ok(_) => {
                self.discard_corrupt(fingerprint, &key, "payload failed validation")
                    .await;
                CacheLookup::Miss
            }
            Err(e) => {
                self.discard_corrupt(fingerprint, &key, &e.to_string()).await;
                CacheLookup::Miss
            }
        }
    }

    async fn discard_corrupt(&self, fingerprint: &Fingerprint, key: &str, reason: &str) {
        self.counters.corrupt_entries.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(fingerprint = %fingerprint, reason, "Discarding corrupt cache entry");
        self.store.delete(key).await;
    }

    async fn write(&self, entry: &CacheEntry, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(fingerprint = %entry.fingerprint, error = %e, "Failed to encode cache entry");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match self
            .store
            .set_with_ttl(&keys::cache(&entry.fingerprint), &raw, ttl)
            .await
        {
            StoreWrite::Written => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                true
            }
            StoreWrite::Unavailable => {
                tracing::debug!(fingerprint = %entry.fingerprint, "Cache write skipped, store unavailable");
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValueStore;
    use crate::memory::InMemoryStore;
    use std::sync::atomic::AtomicUsize;
    use threadloom_core::{ContentSource, ManualClock, StoreError};

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: ManualClock,
        cache: ContentCache,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::at(2024, 6, 1, 8, 0, 0);
        let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
        let client = Arc::new(DegradableStoreClient::new(
            store.clone(),
            Duration::from_millis(100),
        ));
        let cache = ContentCache::new(client, Arc::new(clock.clone()), Duration::from_secs(3600));
        Fixture { store, clock, cache }
    }

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::for_source(&ContentSource::Text(text.to_string()), 280, false)
    }

    fn payload() -> Vec<Segment> {
        vec![
            Segment::new(1, 2, "First post.".to_string()),
            Segment::new(2, 2, "Second post.".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let f = fixture();
        let key = fp("hello");
        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);

        assert!(f.cache.store(&key, payload(), Duration::from_secs(60)).await);
        let entry = f.cache.lookup(&key).await.into_entry();
        assert_eq!(entry.map(|e| e.payload), Some(payload()));

        let stats = f.cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let f = fixture();
        let key = fp("hello");
        f.cache.store(&key, payload(), Duration::from_secs(60)).await;

        f.clock.advance(Duration::from_secs(61));
        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_miss() {
        let f = fixture();
        let key = fp("hello");
        f.cache.store_default(&key, payload()).await;

        f.store.set_offline(true);
        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
        assert!(!f.cache.store_default(&key, payload()).await);
        assert_eq!(f.cache.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_removed() -> Result<(), StoreError> {
        let f = fixture();
        let key = fp("hello");
        let raw_key = keys::cache(&key);
        f.store
            .set_with_ttl(&raw_key, "{not json", Duration::from_secs(60))
            .await?;

        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
        assert_eq!(f.cache.stats().corrupt_entries, 1);
        assert_eq!(f.store.get(&raw_key).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_entry_under_wrong_fingerprint_is_rejected() {
        let f = fixture();
        let other = fp("other");
        f.cache.store_default(&other, payload()).await;

        // Copy the entry for `other` under a different key.
        let raw = match f.store.get(&keys::cache(&other)).await {
            Ok(Some(raw)) => raw,
            unexpected => panic!("expected stored entry, got {:?}", unexpected),
        };
        let key = fp("hello");
        let _ = f
            .store
            .set_with_ttl(&keys::cache(&key), &raw, Duration::from_secs(60))
            .await;

        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_get_or_generate_runs_generator_once() -> Result<(), String> {
        let f = fixture();
        let key = fp("hello");
        let calls = AtomicUsize::new(0);

        let first = f
            .cache
            .get_or_generate(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(payload())
            })
            .await?;
        assert!(!first.hit);

        let second = f
            .cache
            .get_or_generate(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(payload())
            })
            .await?;
        assert!(second.hit);
        assert_eq!(second.entry.payload, first.entry.payload);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.cache.stats().in_flight, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_generator_error_is_not_cached() {
        let f = fixture();
        let key = fp("hello");
        let result = f
            .cache
            .get_or_generate(&key, || async { Err::<Vec<Segment>, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_cancelled_fills_release_their_gates() {
        let f = fixture();
        for i in 0..100 {
            let key = fp(&format!("text {}", i));
            let fill = f.cache.get_or_generate(&key, || async {
                std::future::pending::<Result<Vec<Segment>, String>>().await
            });
            let outcome = tokio::time::timeout(Duration::from_millis(5), fill).await;
            assert!(outcome.is_err());
        }
        assert_eq!(f.cache.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_waiter_runs_generator_after_leader_is_cancelled() -> Result<(), String> {
        let f = Arc::new(fixture());
        let key = fp("hello");

        let leader = {
            let f = f.clone();
            let key = key.clone();
            tokio::spawn(async move {
                f.cache
                    .get_or_generate(&key, || async {
                        std::future::pending::<Result<Vec<Segment>, String>>().await
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.cache.stats().in_flight, 1);

        leader.abort();
        let _ = leader.await;

        let fill = f
            .cache
            .get_or_generate(&key, || async { Ok::<_, String>(payload()) })
            .await?;
        assert!(!fill.hit);
        assert_eq!(f.cache.stats().in_flight, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_purge() {
        let f = fixture();
        let key = fp("hello");
        f.cache.store_default(&key, payload()).await;
        assert!(f.cache.purge(&key).await);
        assert!(!f.cache.purge(&key).await);
        assert_eq!(f.cache.lookup(&key).await, CacheLookup::Miss);
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }
}

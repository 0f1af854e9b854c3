//! Content cache behaviour under concurrency and store outages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use threadloom_storage::{ContentCache, DegradableStoreClient, InMemoryStore, RedisStore};
use threadloom_test_utils::assertions::assert_segments_well_formed;
use threadloom_test_utils::fixtures::{sample_segments, text_fingerprint};
use threadloom_test_utils::ManualClock;
use tokio::sync::Barrier;

fn cache() -> (Arc<InMemoryStore>, Arc<ContentCache>) {
    let clock = ManualClock::at(2024, 2, 1, 0, 0, 0);
    let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
    let client = Arc::new(DegradableStoreClient::new(
        store.clone(),
        Duration::from_millis(100),
    ));
    let cache = Arc::new(ContentCache::new(
        client,
        Arc::new(clock),
        Duration::from_secs(86_400),
    ));
    (store, cache)
}

async fn fill_concurrently(cache: Arc<ContentCache>, callers: usize) -> (usize, usize) {
    let fingerprint = text_fingerprint("the same request");
    let generated = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(callers));

    let mut handles = Vec::new();
    for _ in 0..callers {
        let cache = cache.clone();
        let fingerprint = fingerprint.clone();
        let generated = generated.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .get_or_generate(&fingerprint, || async {
                    generated.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(sample_segments(3))
                })
                .await
        }));
    }

    let mut hits = 0;
    for handle in handles {
        let fill = handle
            .await
            .expect("task panicked")
            .expect("generation failed");
        assert_segments_well_formed(&fill.entry.payload, 280);
        if fill.hit {
            hits += 1;
        }
    }
    (generated.load(Ordering::SeqCst), hits)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fills_generate_once() {
    let (_, cache) = cache();
    let (generated, hits) = fill_concurrently(cache.clone(), 8).await;

    assert_eq!(generated, 1);
    assert_eq!(hits, 7);
    assert_eq!(cache.stats().in_flight, 0);
    assert_eq!(cache.stats().writes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fills_coalesce_while_store_is_down() {
    let (store, cache) = cache();
    store.set_offline(true);

    let (generated, _) = fill_concurrently(cache.clone(), 8).await;
    assert_eq!(generated, 1);
    assert_eq!(cache.stats().writes, 0);
}

#[tokio::test]
async fn test_round_trip_returns_equal_payload() {
    let (_, cache) = cache();
    let fingerprint = text_fingerprint("round trip");
    let payload = sample_segments(4);

    assert!(
        cache
            .store(&fingerprint, payload.clone(), Duration::from_secs(60))
            .await
    );
    let entry = cache
        .lookup(&fingerprint)
        .await
        .into_entry()
        .expect("expected a hit");
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.fingerprint, fingerprint);
}

#[tokio::test]
async fn test_unreachable_redis_fails_fast() {
    let started = std::time::Instant::now();
    let result = RedisStore::connect("redis://127.0.0.1:1/", Duration::from_millis(200)).await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
}

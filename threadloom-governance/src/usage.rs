//! Free-tier usage counting over fixed UTC windows.
//!
//! Each admission charges both the daily and the monthly window, then
//! compares the post-increment counts with the limits. A charge is never
//! rolled back, even when the other window rejects the request.
//!
//! When the store cannot be reached the counter fails open: the request is
//! allowed and the result is flagged `degraded`.

use std::sync::Arc;

use serde::Serialize;
use threadloom_core::{Clock, Identity, Period, Timestamp};
use threadloom_storage::{keys, DegradableStoreClient, StoreCount, StoreRead};

/// Outcome of charging one request against both windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionResult {
    pub allowed_daily: bool,
    pub allowed_monthly: bool,
    pub daily_count: u64,
    pub daily_limit: u32,
    pub monthly_count: u64,
    pub monthly_limit: u32,
    /// A window could not be charged and the request was admitted anyway.
    /// Windows the store did answer for were still charged and report
    /// their counts; the others report 0.
    pub degraded: bool,
}

impl AdmissionResult {
    /// Both windows admit the request.
    pub fn allowed(&self) -> bool {
        self.allowed_daily && self.allowed_monthly
    }

    pub fn remaining_daily(&self) -> u64 {
        u64::from(self.daily_limit).saturating_sub(self.daily_count)
    }

    pub fn remaining_monthly(&self) -> u64 {
        u64::from(self.monthly_limit).saturating_sub(self.monthly_count)
    }
}

/// Current counts for an identity, read without charging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub daily_count: u64,
    pub daily_limit: u32,
    pub monthly_count: u64,
    pub monthly_limit: u32,
    pub daily_resets_at: Timestamp,
    pub monthly_resets_at: Timestamp,
    pub degraded: bool,
}

impl UsageSnapshot {
    pub fn remaining_daily(&self) -> u64 {
        u64::from(self.daily_limit).saturating_sub(self.daily_count)
    }

    pub fn remaining_monthly(&self) -> u64 {
        u64::from(self.monthly_limit).saturating_sub(self.monthly_count)
    }
}

/// Per-identity counter over daily and monthly windows.
#[derive(Debug, Clone)]
pub struct UsageCounter {
    store: Arc<DegradableStoreClient>,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
    monthly_limit: u32,
}

impl UsageCounter {
    pub fn new(
        store: Arc<DegradableStoreClient>,
        clock: Arc<dyn Clock>,
        daily_limit: u32,
        monthly_limit: u32,
    ) -> Self {
        Self {
            store,
            clock,
            daily_limit,
            monthly_limit,
        }
    }

    /// Charge one request to both windows and decide whether it is allowed.
    pub async fn check_and_increment(&self, identity: &Identity) -> AdmissionResult {
        let now = self.clock.now();
        let (daily, monthly) = tokio::join!(
            self.charge(Period::Daily, identity, now),
            self.charge(Period::Monthly, identity, now),
        );

        match (daily, monthly) {
            (Some(daily_count), Some(monthly_count)) => AdmissionResult {
                allowed_daily: daily_count <= u64::from(self.daily_limit),
                allowed_monthly: monthly_count <= u64::from(self.monthly_limit),
                daily_count,
                daily_limit: self.daily_limit,
                monthly_count,
                monthly_limit: self.monthly_limit,
                degraded: false,
            },
            (daily, monthly) => {
                tracing::warn!(
                    identity = %identity,
                    "Usage store unavailable, admitting request without a full count"
                );
                AdmissionResult {
                    allowed_daily: true,
                    allowed_monthly: true,
                    daily_count: daily.unwrap_or(0),
                    daily_limit: self.daily_limit,
                    monthly_count: monthly.unwrap_or(0),
                    monthly_limit: self.monthly_limit,
                    degraded: true,
                }
            }
        }
    }

    /// Read both windows without charging.
    pub async fn snapshot(&self, identity: &Identity) -> UsageSnapshot {
        let now = self.clock.now();
        let (daily, monthly) = tokio::join!(
            self.read(Period::Daily, identity, now),
            self.read(Period::Monthly, identity, now),
        );

        UsageSnapshot {
            daily_count: daily.unwrap_or(0),
            daily_limit: self.daily_limit,
            monthly_count: monthly.unwrap_or(0),
            monthly_limit: self.monthly_limit,
            daily_resets_at: Period::Daily.window_end(now),
            monthly_resets_at: Period::Monthly.window_end(now),
            degraded: daily.is_none() || monthly.is_none(),
        }
    }

    async fn charge(&self, period: Period, identity: &Identity, now: Timestamp) -> Option<u64> {
        let key = keys::usage(period, identity, now);
        match self.store.incr_with_ttl(&key, period.remaining(now)).await {
            StoreCount::Counted(count) => Some(u64::try_from(count).unwrap_or(0)),
            StoreCount::Unavailable => None,
        }
    }

    async fn read(&self, period: Period, identity: &Identity, now: Timestamp) -> Option<u64> {
        let key = keys::usage(period, identity, now);
        match self.store.get(&key).await {
            StoreRead::Found(raw) => Some(raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key = %key, "Usage counter holds a non-integer value");
                0
            })),
            StoreRead::Missing => Some(0),
            StoreRead::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use threadloom_core::{ManualClock, StoreError};
    use threadloom_storage::{InMemoryStore, KeyValueStore};

    fn counter(daily: u32, monthly: u32) -> (Arc<InMemoryStore>, ManualClock, UsageCounter) {
        let clock = ManualClock::at(2024, 4, 15, 10, 0, 0);
        let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
        let client = Arc::new(DegradableStoreClient::new(
            store.clone(),
            Duration::from_millis(100),
        ));
        let counter = UsageCounter::new(client, Arc::new(clock.clone()), daily, monthly);
        (store, clock, counter)
    }

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_daily_limit() {
        let (_, _, counter) = counter(3, 50);
        let caller = id("1.2.3.4");

        for expected in 1..=3 {
            let result = counter.check_and_increment(&caller).await;
            assert!(result.allowed());
            assert_eq!(result.daily_count, expected);
        }

        let result = counter.check_and_increment(&caller).await;
        assert!(!result.allowed_daily);
        assert!(result.allowed_monthly);
        assert_eq!(result.daily_count, 4);
        assert_eq!(result.remaining_daily(), 0);
    }

    #[tokio::test]
    async fn test_rejected_requests_are_still_charged() {
        let (_, _, counter) = counter(1, 2);
        let caller = id("u1");

        counter.check_and_increment(&caller).await;
        let second = counter.check_and_increment(&caller).await;
        assert!(!second.allowed_daily);
        assert_eq!(second.monthly_count, 2);

        let third = counter.check_and_increment(&caller).await;
        assert!(!third.allowed_monthly);
        assert_eq!(third.monthly_count, 3);
    }

    #[tokio::test]
    async fn test_daily_window_resets_at_utc_midnight() {
        let (_, clock, counter) = counter(1, 50);
        let caller = id("u1");

        assert!(counter.check_and_increment(&caller).await.allowed());
        assert!(!counter.check_and_increment(&caller).await.allowed());

        clock.advance(Duration::from_secs(14 * 3600));
        let next_day = counter.check_and_increment(&caller).await;
        assert!(next_day.allowed());
        assert_eq!(next_day.daily_count, 1);
        assert_eq!(next_day.monthly_count, 3);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let (_, _, counter) = counter(1, 50);
        assert!(counter.check_and_increment(&id("a")).await.allowed());
        assert!(counter.check_and_increment(&id("b")).await.allowed());
    }

    #[tokio::test]
    async fn test_fails_open_when_store_unavailable() {
        let (store, _, counter) = counter(1, 1);
        store.set_offline(true);

        for _ in 0..5 {
            let result = counter.check_and_increment(&id("u1")).await;
            assert!(result.allowed());
            assert!(result.degraded);
        }
    }

    /// Fails increments of monthly counters only.
    struct MonthlyOutage(InMemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for MonthlyOutage {
        fn backend_name(&self) -> &'static str {
            "monthly-outage"
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key).await
        }

        async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.0.set_with_ttl(key, value, ttl).await
        }

        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.0.set_if_absent(key, value, ttl).await
        }

        async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
            if key.starts_with("usage:monthly:") {
                return Err(StoreError::Offline);
            }
            self.0.incr_with_ttl(key, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.0.delete(key).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
    }

    #[tokio::test]
    async fn test_partial_outage_still_charges_reachable_window() {
        let clock = ManualClock::at(2024, 4, 15, 10, 0, 0);
        let store = Arc::new(MonthlyOutage(InMemoryStore::new(Arc::new(clock.clone()))));
        let client = Arc::new(DegradableStoreClient::new(store, Duration::from_millis(100)));
        let counter = UsageCounter::new(client, Arc::new(clock), 5, 50);
        let caller = id("1.2.3.4");

        counter.check_and_increment(&caller).await;
        let result = counter.check_and_increment(&caller).await;
        assert!(result.degraded);
        assert!(result.allowed());
        assert_eq!(result.daily_count, 2);
        assert_eq!(result.monthly_count, 0);
    }

    #[tokio::test]
    async fn test_snapshot_does_not_charge() {
        let (_, _, counter) = counter(5, 50);
        let caller = id("u1");
        counter.check_and_increment(&caller).await;

        let snapshot = counter.snapshot(&caller).await;
        assert_eq!(snapshot.daily_count, 1);
        assert_eq!(snapshot.remaining_daily(), 4);
        assert_eq!(snapshot.remaining_monthly(), 49);
        assert_eq!(counter.snapshot(&caller).await.daily_count, 1);
        assert!(!snapshot.degraded);
    }

    #[tokio::test]
    async fn test_snapshot_degraded_when_store_unavailable() {
        let (store, _, counter) = counter(5, 50);
        store.set_offline(true);
        let snapshot = counter.snapshot(&id("u1")).await;
        assert!(snapshot.degraded);
        assert_eq!(snapshot.daily_count, 0);
    }
}

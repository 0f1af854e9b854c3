//! Injectable time source.
//!
//! Window boundaries and entitlement expiry are evaluated against a [`Clock`]
//! rather than `Utc::now()` directly, so tests can fast-forward time and
//! every component in one process agrees on "now".

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::Timestamp;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a test can hand one clone to
/// the components under test and keep another to advance time.
#[derive(Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Create a clock frozen at the given UTC calendar instant.
    ///
    /// Out-of-range components fall back to the Unix epoch.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self::new(start)
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute instant (may move backwards, to model skew).
    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock").field("now", &self.now()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(2024, 3, 1, 12, 0, 0);
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!((clock.now() - start).num_seconds(), 90);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::at(2024, 3, 1, 0, 0, 0);
        let handle = clock.clone();
        handle.advance(Duration::from_secs(24 * 60 * 60));
        assert_eq!(clock.now(), handle.now());
        assert_eq!(clock.now().format("%Y-%m-%d").to_string(), "2024-03-02");
    }

    #[test]
    fn test_manual_clock_set_backwards() {
        let clock = ManualClock::at(2024, 3, 1, 0, 0, 0);
        let earlier = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        clock.set(earlier);
        assert_eq!(clock.now(), earlier);
    }

    #[test]
    fn test_system_clock_is_close_to_now() {
        let diff = (SystemClock.now() - Utc::now()).num_seconds().abs();
        assert!(diff < 5);
    }
}

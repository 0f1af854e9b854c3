//! Fixed calendar windows for usage accounting.
//!
//! Windows are aligned to UTC calendar boundaries: midnight for the daily
//! window and the first of the month for the monthly window.

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Usage accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Monthly,
}

impl Period {
    /// Both periods, in the order they are charged.
    pub const ALL: [Period; 2] = [Period::Daily, Period::Monthly];

    /// Name used in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Monthly => "monthly",
        }
    }

    /// Stable key of the window containing `now` (`YYYY-MM-DD` or `YYYY-MM`).
    pub fn window_key(&self, now: Timestamp) -> String {
        match self {
            Period::Daily => now.format("%Y-%m-%d").to_string(),
            Period::Monthly => now.format("%Y-%m").to_string(),
        }
    }

    /// Start of the window containing `now`.
    pub fn window_start(&self, now: Timestamp) -> Timestamp {
        let date = match self {
            Period::Daily => now.date_naive(),
            Period::Monthly => first_of_month(now.year(), now.month()),
        };
        midnight(date)
    }

    /// First instant of the window after the one containing `now`.
    pub fn window_end(&self, now: Timestamp) -> Timestamp {
        let date = match self {
            Period::Daily => now
                .date_naive()
                .succ_opt()
                .unwrap_or(NaiveDate::MAX),
            Period::Monthly => {
                if now.month() == 12 {
                    first_of_month(now.year() + 1, 1)
                } else {
                    first_of_month(now.year(), now.month() + 1)
                }
            }
        };
        midnight(date)
    }

    /// Time remaining until the window containing `now` closes.
    ///
    /// Never zero, so it is always usable as a store TTL.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        (self.window_end(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

fn midnight(date: NaiveDate) -> Timestamp {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

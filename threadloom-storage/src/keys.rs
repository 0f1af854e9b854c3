//! Store key layout.
//!
//! | Key                                   | Holds                          |
//! |---------------------------------------|--------------------------------|
//! | `usage:daily:{identity}:{YYYY-MM-DD}` | daily counter                  |
//! | `usage:monthly:{identity}:{YYYY-MM}`  | monthly counter                |
//! | `entitlement:{identity}`              | entitlement record (JSON)      |
//! | `grantApplied:{identity}:{grantId}`   | grant deduplication sentinel   |
//! | `cache:{fingerprint}`                 | cached post sequence (JSON)    |
//!
//! In `grantApplied` keys the identity is escaped (`%` as `%25`, `:` as
//! `%3A`) so the first `:` after it always separates it from the grant id.

use threadloom_core::{Fingerprint, Identity, Period, Timestamp};

/// Counter key for the window of `period` containing `now`.
pub fn usage(period: Period, identity: &Identity, now: Timestamp) -> String {
    format!(
        "usage:{}:{}:{}",
        period.as_str(),
        identity,
        period.window_key(now)
    )
}

pub fn entitlement(identity: &Identity) -> String {
    format!("entitlement:{}", identity)
}

pub fn grant_applied(identity: &Identity, grant_id: &str) -> String {
    format!("grantApplied:{}:{}", escape_segment(identity.as_str()), grant_id)
}

fn escape_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

pub fn cache(fingerprint: &Fingerprint) -> String {
    format!("cache:{}", fingerprint)
}

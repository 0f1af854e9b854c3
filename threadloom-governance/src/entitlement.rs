//! Premium entitlements granted by verified payments.
//!
//! `grant` is idempotent per grant id. The sentinel under `grantApplied` is
//! two-phase: the first delivery claims it as `pending` with an atomic
//! write-if-absent, writes the entitlement record, then marks it `applied`.
//! A redelivery that finds `applied` changes nothing. One that finds
//! `pending` resumes the grant unless the stored record already carries
//! this grant id, so a store failure between the steps never loses a paid
//! grant.
//!
//! Reads fail closed. An unreachable store means no premium access.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadloom_core::{Clock, GrantError, Identity, Timestamp};
use threadloom_storage::{keys, DegradableStoreClient, StoreClaim, StoreRead, StoreWrite};

const GRANT_PENDING: &str = "pending";
const GRANT_APPLIED: &str = "applied";

/// Stored under `entitlement:{identity}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct EntitlementRecord {
    expires_at: Timestamp,
    grant_id: String,
}

enum RecordRead {
    Present(EntitlementRecord),
    Absent,
    Unavailable,
}

/// Result of a grant call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GrantOutcome {
    /// The grant was new and the entitlement now runs until `expires_at`.
    Applied { expires_at: Timestamp },
    /// The grant id had already been applied; the entitlement is unchanged.
    Duplicate,
}

impl GrantOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantOutcome::Applied { .. } => "applied",
            GrantOutcome::Duplicate => "duplicate",
        }
    }
}

/// Entitlement state of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitlementStatus {
    pub active: bool,
    /// Expiry of the stored entitlement, if one is stored and unexpired.
    pub expires_at: Option<Timestamp>,
    /// The store could not be read; `active` is false regardless.
    pub degraded: bool,
}

impl EntitlementStatus {
    fn inactive(degraded: bool) -> Self {
        Self {
            active: false,
            expires_at: None,
            degraded,
        }
    }
}

/// Reads and grants time-boxed premium access.
#[derive(Debug, Clone)]
pub struct Entitlements {
    store: Arc<DegradableStoreClient>,
    clock: Arc<dyn Clock>,
    grant_record_ttl: Duration,
    stacking: bool,
}

impl Entitlements {
    /// `grant_record_ttl` bounds how long applied grant ids are remembered.
    /// With `stacking`, a grant on an active entitlement extends it instead
    /// of restarting it from now.
    pub fn new(
        store: Arc<DegradableStoreClient>,
        clock: Arc<dyn Clock>,
        grant_record_ttl: Duration,
        stacking: bool,
    ) -> Self {
        Self {
            store,
            clock,
            grant_record_ttl,
            stacking,
        }
    }

    /// Whether `identity` holds an unexpired entitlement.
    pub async fn has_active(&self, identity: &Identity) -> bool {
        self.status(identity).await.active
    }

    pub async fn status(&self, identity: &Identity) -> EntitlementStatus {
        let now = self.clock.now();
        match self.read_record(identity).await {
            RecordRead::Present(record) if record.expires_at > now => EntitlementStatus {
                active: true,
                expires_at: Some(record.expires_at),
                degraded: false,
            },
            RecordRead::Present(_) | RecordRead::Absent => EntitlementStatus::inactive(false),
            RecordRead::Unavailable => EntitlementStatus::inactive(true),
        }
    }

    /// Grant `duration` of premium access, once per `grant_id`.
    ///
    /// Fails only when the store cannot record the grant, so the payment
    /// provider can redeliver.
    pub async fn grant(
        &self,
        identity: &Identity,
        grant_id: &str,
        duration: Duration,
    ) -> Result<GrantOutcome, GrantError> {
        let grant_id = grant_id.trim();
        if grant_id.is_empty() {
            return Err(GrantError::EmptyGrantId);
        }
        let unavailable = || GrantError::StoreUnavailable {
            identity: identity.to_string(),
            grant_id: grant_id.to_string(),
        };

        let now = self.clock.now();
        let sentinel = keys::grant_applied(identity, grant_id);
        let sentinel_ttl = self.grant_record_ttl.max(duration);

        let claimed = match self
            .store
            .set_if_absent(&sentinel, GRANT_PENDING, sentinel_ttl)
            .await
        {
            StoreClaim::Claimed => true,
            StoreClaim::AlreadyClaimed => false,
            StoreClaim::Unavailable => return Err(unavailable()),
        };

        if !claimed {
            match self.store.get(&sentinel).await {
                StoreRead::Found(state) if state == GRANT_APPLIED => {
                    tracing::info!(identity = %identity, grant_id, "Duplicate grant ignored");
                    return Ok(GrantOutcome::Duplicate);
                }
                StoreRead::Found(_) | StoreRead::Missing => {}
                StoreRead::Unavailable => return Err(unavailable()),
            }
        }

        let current = if self.stacking || !claimed {
            match self.read_record(identity).await {
                RecordRead::Present(record) => Some(record),
                RecordRead::Absent => None,
                RecordRead::Unavailable => return Err(unavailable()),
            }
        } else {
            None
        };

        if !claimed {
            if current.as_ref().is_some_and(|record| record.grant_id == grant_id) {
                self.mark_applied(&sentinel, sentinel_ttl).await;
                tracing::info!(identity = %identity, grant_id, "Duplicate grant ignored");
                return Ok(GrantOutcome::Duplicate);
            }
            tracing::warn!(identity = %identity, grant_id, "Resuming unfinished grant");
        }

        let base = match current {
            Some(current) if self.stacking => current.expires_at.max(now),
            _ => now,
        };
        let expires_at = expiry_after(base, duration);

        let record = EntitlementRecord {
            expires_at,
            grant_id: grant_id.to_string(),
        };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode entitlement record");
                return Err(unavailable());
            }
        };
        let ttl = (expires_at - now)
            .to_std()
            .unwrap_or(duration)
            .max(Duration::from_secs(1));

        match self
            .store
            .set_with_ttl(&keys::entitlement(identity), &raw, ttl)
            .await
        {
            StoreWrite::Written => {
                self.mark_applied(&sentinel, sentinel_ttl).await;
                tracing::info!(
                    identity = %identity,
                    grant_id,
                    expires_at = %expires_at,
                    "Entitlement granted"
                );
                Ok(GrantOutcome::Applied { expires_at })
            }
            // The sentinel stays pending, so a redelivery resumes the grant.
            StoreWrite::Unavailable => Err(unavailable()),
        }
    }

    /// Undecodable records read as absent.
    async fn read_record(&self, identity: &Identity) -> RecordRead {
        match self.store.get(&keys::entitlement(identity)).await {
            StoreRead::Found(raw) => match serde_json::from_str(&raw) {
                Ok(record) => RecordRead::Present(record),
                Err(e) => {
                    tracing::warn!(identity = %identity, error = %e, "Undecodable entitlement record");
                    RecordRead::Absent
                }
            },
            StoreRead::Missing => RecordRead::Absent,
            StoreRead::Unavailable => RecordRead::Unavailable,
        }
    }

    /// A failed mark leaves the sentinel pending; the next redelivery finds
    /// the record carrying this grant id and settles it then.
    async fn mark_applied(&self, sentinel: &str, ttl: Duration) {
        if let StoreWrite::Unavailable = self.store.set_with_ttl(sentinel, GRANT_APPLIED, ttl).await {
            tracing::warn!(sentinel, "Grant applied but sentinel left pending");
        }
    }
}

fn expiry_after(base: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| base.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

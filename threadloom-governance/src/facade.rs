//! Admission decisions.
//!
//! ```text
//! admit(identity, fingerprint)
//!   ├─ active entitlement? ──────────────► proceed, premium
//!   ├─ cached payload?     ──────────────► proceed, cache_hit (not charged)
//!   └─ charge usage windows
//!        ├─ within both limits ──────────► proceed, free_tier
//!        └─ otherwise ───────────────────► reject, limit_exceeded
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use threadloom_core::{
    CacheEntry, Clock, Fingerprint, GovernanceConfig, GrantError, Identity, Segment,
};
use threadloom_storage::{ContentCache, DegradableStoreClient, KeyValueStore};

use crate::entitlement::{EntitlementStatus, Entitlements, GrantOutcome};
use crate::usage::{AdmissionResult, UsageCounter, UsageSnapshot};

/// Why a request was admitted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Premium,
    CacheHit,
    FreeTier,
    LimitExceeded,
}

impl DecisionReason {
    pub const ALL: [DecisionReason; 4] = [
        DecisionReason::Premium,
        DecisionReason::CacheHit,
        DecisionReason::FreeTier,
        DecisionReason::LimitExceeded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Premium => "premium",
            DecisionReason::CacheHit => "cache_hit",
            DecisionReason::FreeTier => "free_tier",
            DecisionReason::LimitExceeded => "limit_exceeded",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub proceed: bool,
    /// Payload to return instead of generating, on a cache hit.
    pub cached: Option<CacheEntry>,
    pub reason: DecisionReason,
    /// Post-charge counts, when the usage counter was consulted.
    pub usage: Option<AdmissionResult>,
    /// Some part of the decision was made without the store.
    pub degraded: bool,
}

/// Usage counts and entitlement state for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub usage: UsageSnapshot,
    pub entitlement: EntitlementStatus,
}

/// Single entry point for admission, cache fills, and grants.
#[derive(Debug)]
pub struct GovernanceFacade {
    config: GovernanceConfig,
    store: Arc<DegradableStoreClient>,
    cache: ContentCache,
    usage: UsageCounter,
    entitlements: Entitlements,
}

impl GovernanceFacade {
    /// Build every component over one shared store client.
    pub fn new(
        config: GovernanceConfig,
        store: Arc<DegradableStoreClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ContentCache::new(store.clone(), clock.clone(), config.cache_ttl);
        let usage = UsageCounter::new(
            store.clone(),
            clock.clone(),
            config.daily_limit,
            config.monthly_limit,
        );
        let entitlements = Entitlements::new(
            store.clone(),
            clock,
            config.grant_record_ttl,
            config.entitlement_stacking,
        );
        Self {
            config,
            store,
            cache,
            usage,
            entitlements,
        }
    }

    /// Wrap `backend` in a client bounded by the configured store timeout.
    pub fn with_backend(
        config: GovernanceConfig,
        backend: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(DegradableStoreClient::new(backend, config.store_timeout));
        Self::new(config, store, clock)
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn store(&self) -> &DegradableStoreClient {
        &self.store
    }

    /// Decide whether `identity` may generate the content behind `fingerprint`.
    pub async fn admit(&self, identity: &Identity, fingerprint: &Fingerprint) -> Decision {
        let entitlement = self.entitlements.status(identity).await;
        if entitlement.active {
            tracing::debug!(identity = %identity, "Admitted: premium");
            return Decision {
                proceed: true,
                cached: None,
                reason: DecisionReason::Premium,
                usage: None,
                degraded: false,
            };
        }

        if let Some(entry) = self.cache.lookup(fingerprint).await.into_entry() {
            tracing::debug!(identity = %identity, fingerprint = %fingerprint, "Admitted: cache hit");
            return Decision {
                proceed: true,
                cached: Some(entry),
                reason: DecisionReason::CacheHit,
                usage: None,
                degraded: entitlement.degraded,
            };
        }

        let admission = self.usage.check_and_increment(identity).await;
        let degraded = entitlement.degraded || admission.degraded;
        if admission.allowed() {
            tracing::debug!(
                identity = %identity,
                daily_count = admission.daily_count,
                monthly_count = admission.monthly_count,
                degraded,
                "Admitted: free tier"
            );
            Decision {
                proceed: true,
                cached: None,
                reason: DecisionReason::FreeTier,
                usage: Some(admission),
                degraded,
            }
        } else {
            tracing::info!(
                identity = %identity,
                daily_count = admission.daily_count,
                daily_limit = admission.daily_limit,
                monthly_count = admission.monthly_count,
                monthly_limit = admission.monthly_limit,
                "Rejected: usage limit exceeded"
            );
            Decision {
                proceed: false,
                cached: None,
                reason: DecisionReason::LimitExceeded,
                usage: Some(admission),
                degraded,
            }
        }
    }

    /// Cache freshly generated output. Best-effort.
    pub async fn record(&self, fingerprint: &Fingerprint, segments: Vec<Segment>) -> bool {
        self.cache.store_default(fingerprint, segments).await
    }

    /// Current counts and entitlement state, without charging.
    pub async fn usage(&self, identity: &Identity) -> UsageReport {
        let (usage, entitlement) = tokio::join!(
            self.usage.snapshot(identity),
            self.entitlements.status(identity),
        );
        UsageReport { usage, entitlement }
    }

    /// Apply a verified payment. Idempotent per `grant_id`.
    pub async fn grant(
        &self,
        identity: &Identity,
        grant_id: &str,
        duration: Duration,
    ) -> Result<GrantOutcome, GrantError> {
        self.entitlements.grant(identity, grant_id, duration).await
    }

    pub async fn has_active_entitlement(&self, identity: &Identity) -> bool {
        self.entitlements.has_active(identity).await
    }

    /// Probe the store.
    pub async fn store_available(&self) -> bool {
        self.store.ping().await
    }
}

//! End-to-end admission and entitlement scenarios over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use threadloom_governance::{DecisionReason, GrantOutcome, UsageCounter};
use threadloom_storage::DegradableStoreClient;
use threadloom_test_utils::assertions::assert_decision;
use threadloom_test_utils::fixtures::{identity, sample_segments, test_config, text_fingerprint, DAY};
use threadloom_test_utils::harness::GovernanceHarness;
use threadloom_test_utils::{Clock, GovernanceConfig};

#[tokio::test]
async fn test_sixth_free_request_is_rejected() {
    let harness = GovernanceHarness::new(test_config().with_limits(5, 50));
    let caller = identity("1.2.3.4");

    for n in 0..5 {
        let decision = harness
            .facade
            .admit(&caller, &text_fingerprint(&format!("request {}", n)))
            .await;
        assert_decision(&decision, true, DecisionReason::FreeTier);
    }

    let sixth = harness
        .facade
        .admit(&caller, &text_fingerprint("request 5"))
        .await;
    assert_decision(&sixth, false, DecisionReason::LimitExceeded);
    let usage = sixth.usage.expect("counts are reported on rejection");
    assert_eq!(usage.daily_count, 6);
    assert_eq!(usage.daily_limit, 5);
    assert_eq!(usage.remaining_daily(), 0);
}

#[tokio::test]
async fn test_monthly_limit_applies_across_days() {
    let harness = GovernanceHarness::new(test_config().with_limits(2, 3));
    let caller = identity("1.2.3.4");

    for n in 0..2 {
        let d = harness
            .facade
            .admit(&caller, &text_fingerprint(&format!("a{}", n)))
            .await;
        assert!(d.proceed);
    }
    harness.advance(DAY);
    let third = harness.facade.admit(&caller, &text_fingerprint("b0")).await;
    assert!(third.proceed);
    let fourth = harness.facade.admit(&caller, &text_fingerprint("b1")).await;
    assert_decision(&fourth, false, DecisionReason::LimitExceeded);
    assert!(fourth.usage.is_some_and(|u| u.allowed_daily && !u.allowed_monthly));
}

#[tokio::test]
async fn test_cached_request_does_not_consume_quota() {
    let harness = GovernanceHarness::new(test_config().with_limits(1, 50));
    let caller = identity("1.2.3.4");
    let fp = text_fingerprint("popular");

    let first = harness.facade.admit(&caller, &fp).await;
    assert_decision(&first, true, DecisionReason::FreeTier);
    harness.facade.record(&fp, sample_segments(2)).await;

    for _ in 0..3 {
        let decision = harness.facade.admit(&caller, &fp).await;
        assert_decision(&decision, true, DecisionReason::CacheHit);
        assert_eq!(
            decision.cached.map(|entry| entry.payload),
            Some(sample_segments(2))
        );
    }

    let report = harness.facade.usage(&caller).await;
    assert_eq!(report.usage.daily_count, 1);
}

#[tokio::test]
async fn test_grant_lasts_thirty_days() {
    let harness = GovernanceHarness::with_defaults();
    let u1 = identity("u1");
    assert!(!harness.facade.has_active_entitlement(&u1).await);

    let outcome = harness.facade.grant(&u1, "evt-42", DAY * 30).await;
    assert!(matches!(outcome, Ok(GrantOutcome::Applied { .. })));
    assert!(harness.facade.has_active_entitlement(&u1).await);

    harness.advance(DAY * 31);
    assert!(!harness.facade.has_active_entitlement(&u1).await);
}

#[tokio::test]
async fn test_redelivered_grant_leaves_expiry_unchanged() {
    let harness = GovernanceHarness::with_defaults();
    let u1 = identity("u1");

    let first = harness.facade.grant(&u1, "g1", DAY * 30).await;
    let second = harness.facade.grant(&u1, "g1", DAY * 30).await;
    assert_eq!(second, Ok(GrantOutcome::Duplicate));

    let expires_at = harness.facade.usage(&u1).await.entitlement.expires_at;
    assert_eq!(
        first.map(|o| match o {
            GrantOutcome::Applied { expires_at } => Some(expires_at),
            GrantOutcome::Duplicate => None,
        }),
        Ok(expires_at)
    );
}

#[tokio::test]
async fn test_premium_caller_is_never_limited() {
    let harness = GovernanceHarness::new(test_config().with_limits(1, 1));
    let caller = identity("u1");
    harness
        .facade
        .grant(&caller, "evt-1", DAY * 30)
        .await
        .expect("grant");

    for n in 0..10 {
        let decision = harness
            .facade
            .admit(&caller, &text_fingerprint(&format!("p{}", n)))
            .await;
        assert_decision(&decision, true, DecisionReason::Premium);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_fail_open_during_outage() {
    let harness = GovernanceHarness::new(test_config().with_limits(1, 1));
    harness.set_store_offline(true);
    let caller = identity("1.2.3.4");

    let decisions = join_all((0..32).map(|n| {
        let facade = harness.facade.clone();
        let caller = caller.clone();
        async move {
            facade
                .admit(&caller, &text_fingerprint(&format!("outage {}", n)))
                .await
        }
    }))
    .await;

    assert_eq!(decisions.len(), 32);
    for decision in decisions {
        assert_decision(&decision, true, DecisionReason::FreeTier);
        assert!(decision.degraded);
    }
}

#[tokio::test]
async fn test_entitlement_fails_closed_during_outage() {
    let harness = GovernanceHarness::with_defaults();
    let u1 = identity("u1");
    harness.facade.grant(&u1, "evt-42", DAY * 30).await.expect("grant");

    harness.set_store_offline(true);
    assert!(!harness.facade.has_active_entitlement(&u1).await);
    assert!(matches!(
        harness.facade.grant(&u1, "evt-43", DAY * 30).await,
        Err(threadloom_core::GrantError::StoreUnavailable { .. })
    ));

    harness.set_store_offline(false);
    assert!(harness.facade.has_active_entitlement(&u1).await);
}

#[tokio::test]
async fn test_slow_store_degrades_instead_of_blocking() {
    let harness = GovernanceHarness::new(
        GovernanceConfig::default().with_store_timeout(Duration::from_millis(50)),
    );
    harness.store.set_latency(Duration::from_secs(2));
    let caller = identity("1.2.3.4");

    let started = std::time::Instant::now();
    let decision = harness.facade.admit(&caller, &text_fingerprint("slow")).await;
    assert!(decision.proceed);
    assert!(decision.degraded);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_concurrent_charges_are_never_undercounted() {
    let harness = GovernanceHarness::with_defaults();
    let store = Arc::new(DegradableStoreClient::new(
        harness.store.clone(),
        Duration::from_millis(100),
    ));
    let counter = Arc::new(UsageCounter::new(
        store,
        Arc::new(harness.clock.clone()),
        100,
        1_000,
    ));
    let caller = identity("1.2.3.4");

    join_all((0..40).map(|_| counter.check_and_increment(&caller))).await;
    let snapshot = counter.snapshot(&caller).await;
    assert_eq!(snapshot.daily_count, 40);
    assert_eq!(snapshot.monthly_count, 40);
    assert!(snapshot.daily_resets_at > harness.clock.now());
}

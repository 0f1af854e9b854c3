//! Threadloom Test Utilities
//!
//! Shared test infrastructure for the Threadloom workspace:
//! - Proptest generators for prose and identities
//! - An in-memory governance harness with a manual clock
//! - Fixtures for common values
//! - Custom assertions for segment sequences and errors

// Re-export core types for convenience
pub use threadloom_core::{
    CacheEntry, Clock, ContentSource, Fingerprint, GovernanceConfig, Identity, ManualClock,
    Segment, StoreError, ThreadloomError, ThreadloomResult, Timestamp, ValidationError,
};
pub use threadloom_governance::{Decision, DecisionReason, GovernanceFacade, GrantOutcome};
pub use threadloom_storage::{DegradableStoreClient, InMemoryStore, KeyValueStore};

use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for segmenter and governance inputs.
    //!
    //! Generated prose never contains digits or `/`, so no text can be
    //! mistaken for a numbering suffix.

    use super::*;
    use proptest::prelude::*;

    /// A lowercase word of 1 to 12 letters.
    pub fn arb_word() -> impl Strategy<Value = String> {
        "[a-z]{1,12}"
    }

    /// A word, sometimes followed by clause punctuation.
    pub fn arb_clause_word() -> impl Strategy<Value = String> {
        (
            arb_word(),
            prop_oneof![6 => Just(""), 1 => Just(","), 1 => Just(";"), 1 => Just(":")],
        )
            .prop_map(|(word, punct)| format!("{}{}", word, punct))
    }

    /// One sentence of 1 to 15 words ending in `.`, `!` or `?`.
    pub fn arb_sentence() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(arb_clause_word(), 1..15),
            prop_oneof![4 => Just("."), 1 => Just("!"), 1 => Just("?")],
        )
            .prop_map(|(words, end)| format!("{}{}", words.join(" "), end))
    }

    /// An unbroken run of 20 to 400 letters.
    pub fn arb_long_token() -> impl Strategy<Value = String> {
        "[a-z]{20,400}"
    }

    /// A whitespace run of one to three characters.
    pub fn arb_whitespace() -> impl Strategy<Value = String> {
        prop::collection::vec(prop_oneof![4 => Just(' '), 1 => Just('\n'), 1 => Just('\t')], 1..4)
            .prop_map(|chars| chars.into_iter().collect())
    }

    fn join_with_whitespace(
        unit: impl Strategy<Value = String>,
        max_units: usize,
    ) -> impl Strategy<Value = String> {
        prop::collection::vec((unit, arb_whitespace()), 1..max_units).prop_map(|parts| {
            parts
                .into_iter()
                .map(|(text, ws)| format!("{}{}", text, ws))
                .collect()
        })
    }

    /// Sentences with irregular whitespace and occasional unbroken long tokens.
    pub fn arb_prose() -> impl Strategy<Value = String> {
        join_with_whitespace(
            prop_oneof![8 => arb_sentence(), 1 => arb_long_token()],
            20,
        )
    }

    /// Sentences with irregular whitespace; every word is at most 14 characters.
    pub fn arb_plain_prose() -> impl Strategy<Value = String> {
        join_with_whitespace(arb_sentence(), 20)
    }

    /// An IPv4 address used as a caller identity.
    pub fn arb_ip_identity() -> impl Strategy<Value = Identity> {
        any::<[u8; 4]>().prop_filter_map("identity", |[a, b, c, d]| {
            Identity::new(format!("{}.{}.{}.{}", a, b, c, d)).ok()
        })
    }

    /// A payment-provider style grant id.
    pub fn arb_grant_id() -> impl Strategy<Value = String> {
        "evt-[a-z0-9]{4,16}"
    }
}

// ============================================================================
// GOVERNANCE HARNESS
// ============================================================================

pub mod harness {
    //! In-memory governance stack with a controllable clock and store.

    use super::*;

    /// Facade wired to an [`InMemoryStore`] and a [`ManualClock`].
    pub struct GovernanceHarness {
        pub clock: ManualClock,
        pub store: Arc<InMemoryStore>,
        pub facade: Arc<GovernanceFacade>,
    }

    impl GovernanceHarness {
        /// Harness starting at 2024-01-01T12:00:00Z.
        pub fn new(config: GovernanceConfig) -> Self {
            Self::starting_at(config, ManualClock::at(2024, 1, 1, 12, 0, 0))
        }

        pub fn with_defaults() -> Self {
            Self::new(fixtures::test_config())
        }

        pub fn starting_at(config: GovernanceConfig, clock: ManualClock) -> Self {
            let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
            let facade = Arc::new(GovernanceFacade::with_backend(
                config,
                store.clone(),
                Arc::new(clock.clone()),
            ));
            Self {
                clock,
                store,
                facade,
            }
        }

        /// Make the store fail (or recover).
        pub fn set_store_offline(&self, offline: bool) {
            self.store.set_offline(offline);
        }

        pub fn advance(&self, by: Duration) {
            self.clock.advance(by);
        }

        pub fn now(&self) -> Timestamp {
            self.clock.now()
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common testing scenarios.

    use super::*;

    pub const DAY: Duration = Duration::from_secs(86_400);

    /// Default limits with a store timeout short enough for latency tests.
    pub fn test_config() -> GovernanceConfig {
        GovernanceConfig::default().with_store_timeout(Duration::from_millis(100))
    }

    /// Build an identity, panicking on invalid input.
    #[track_caller]
    pub fn identity(raw: &str) -> Identity {
        Identity::new(raw).unwrap_or_else(|e| panic!("invalid test identity {:?}: {}", raw, e))
    }

    /// Fingerprint of a plain-text request at the default post length.
    pub fn text_fingerprint(text: &str) -> Fingerprint {
        Fingerprint::for_source(&ContentSource::Text(text.to_string()), 280, false)
    }

    /// `count` well-formed plain segments.
    pub fn sample_segments(count: usize) -> Vec<Segment> {
        (1..=count)
            .map(|i| Segment::new(i, count, format!("Post number {}.", i)))
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Threadloom-specific invariants.

    use super::*;

    /// Assert indices run `1..=total`, lengths match text and fit `max_length`.
    #[track_caller]
    pub fn assert_segments_well_formed(segments: &[Segment], max_length: usize) {
        assert!(!segments.is_empty(), "Expected at least one segment");
        let total = segments.len();
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index, i + 1, "Non-contiguous index at position {}", i);
            assert_eq!(seg.total, total, "Wrong total on segment {}", seg.index);
            assert_eq!(
                seg.length,
                seg.text.chars().count(),
                "Recorded length mismatch on segment {}",
                seg.index
            );
            assert!(
                seg.length <= max_length,
                "Segment {} has {} chars, max {}",
                seg.index,
                seg.length,
                max_length
            );
        }
    }

    /// Assert that a ThreadloomResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &ThreadloomResult<T>) {
        match result {
            Err(ThreadloomError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert a decision's outcome.
    #[track_caller]
    pub fn assert_decision(decision: &Decision, proceed: bool, reason: DecisionReason) {
        assert_eq!(
            (decision.proceed, decision.reason),
            (proceed, reason),
            "Unexpected decision: {:?}",
            decision
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Threadloom Core - Shared Types
//!
//! Data model, error taxonomy, configuration, and time source shared by the
//! segmenter, the storage layer, and the governance engine. No I/O lives here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GovernanceConfig, MIN_MAX_LENGTH};
pub use error::{
    ConfigError, GrantError, StoreError, ThreadloomError, ThreadloomResult, ValidationError,
};
pub use fingerprint::{normalize_url, normalize_whitespace, ContentSource, Fingerprint};
pub use window::Period;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Longest identity accepted as a key prefix.
pub const MAX_IDENTITY_LEN: usize = 256;

// ============================================================================
// IDENTITY
// ============================================================================

/// The key (IP address or authenticated user id) usage and entitlement are
/// tracked against.
///
/// Derived per request and never stored as an entity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Build an identity, trimming surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "identity".to_string(),
            });
        }
        if trimmed.len() > MAX_IDENTITY_LEN || trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidValue {
                field: "identity".to_string(),
                reason: format!(
                    "must be at most {} bytes with no inner whitespace",
                    MAX_IDENTITY_LEN
                ),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SEGMENTS AND CACHE ENTRIES
// ============================================================================

/// One post of a thread.
///
/// `index` is 1-based and contiguous; `total` is the number of segments
/// produced from the same input; `length` is `text` measured in characters
/// and never exceeds the max length the segment was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub total: usize,
    pub text: String,
    pub length: usize,
    /// `text` ends with the ` {index}/{total}` suffix added at segmentation.
    #[serde(default)]
    pub numbered: bool,
}

impl Segment {
    /// Create a segment; `length` is derived from `text`.
    pub fn new(index: usize, total: usize, text: String) -> Self {
        let length = text.chars().count();
        Self {
            index,
            total,
            text,
            length,
            numbered: false,
        }
    }

    /// Create a segment whose text is `body` followed by its numbering suffix.
    pub fn numbered(index: usize, total: usize, body: &str) -> Self {
        let mut segment = Self::new(index, total, format!("{} {}/{}", body, index, total));
        segment.numbered = true;
        segment
    }

    /// The numbering suffix (` {index}/{total}`) this segment would carry.
    pub fn numbering_suffix(&self) -> String {
        format!(" {}/{}", self.index, self.total)
    }

    /// The text without the numbering suffix, if this segment carries one.
    pub fn body(&self) -> &str {
        if !self.numbered {
            return &self.text;
        }
        let suffix = self.numbering_suffix();
        self.text.strip_suffix(suffix.as_str()).unwrap_or(&self.text)
    }
}

/// A previously generated post sequence, keyed by request fingerprint.
///
/// The payload for a fingerprint never changes once written; a second writer
/// stores an equivalent value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: Vec<Segment>,
    pub created_at: Timestamp,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, payload: Vec<Segment>, created_at: Timestamp) -> Self {
        Self {
            fingerprint,
            payload,
            created_at,
        }
    }

    /// Structural check applied before a cached payload is trusted.
    ///
    /// Indices must run `1..=total` in order with a consistent `total`, and
    /// every recorded length must match its text.
    pub fn is_well_formed(&self) -> bool {
        let total = self.payload.len();
        total > 0
            && self.payload.iter().enumerate().all(|(i, seg)| {
                seg.index == i + 1 && seg.total == total && seg.length == seg.text.chars().count()
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================

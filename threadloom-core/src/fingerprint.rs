//! Request fingerprints for the content cache.
//!
//! A fingerprint is a SHA-256 over a domain-separated encoding of the
//! normalized source plus the rendering parameters, so two requests that
//! differ only in incidental whitespace or URL casing share one cache entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Where the text to be threaded comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContentSource {
    /// A page to be scraped.
    Url(String),
    /// Text supplied directly by the caller.
    Text(String),
}

impl ContentSource {
    /// Normalized form used for hashing.
    pub fn normalized(&self) -> String {
        match self {
            ContentSource::Url(url) => normalize_url(url),
            ContentSource::Text(text) => normalize_whitespace(text),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            ContentSource::Url(_) => "url",
            ContentSource::Text(_) => "text",
        }
    }
}

/// Lowercase hex SHA-256 identifying one normalized generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a source rendered at `max_length`, with or without numbering.
    pub fn for_source(source: &ContentSource, max_length: usize, numbered: bool) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"threadloom:v1\0");
        hasher.update(source.tag().as_bytes());
        hasher.update(b"\0");
        hasher.update(source.normalized().as_bytes());
        hasher.update(b"\0");
        hasher.update(max_length.to_string().as_bytes());
        hasher.update(if numbered { b"\0n" } else { b"\0p" });
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a fingerprint computed elsewhere.
    ///
    /// Accepts 1 to 128 ASCII alphanumeric, `-` or `_` characters so the
    /// value is always safe to embed in a store key.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidValue {
                field: "fingerprint".to_string(),
                reason: "expected 1-128 characters of [A-Za-z0-9_-]".to_string(),
            })
        }
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a URL for fingerprinting.
///
/// Trims, lowercases the scheme and host, drops any fragment, and drops a
/// trailing `/` from the path. Query strings are kept verbatim.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);

    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, url),
    };

    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let authority = authority.to_ascii_lowercase();

    let (path, query) = match tail.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (tail, None),
    };
    let path = path.trim_end_matches('/');

    let mut normalized = String::with_capacity(url.len());
    if let Some(scheme) = scheme {
        normalized.push_str(&scheme);
        normalized.push_str("://");
    }
    normalized.push_str(&authority);
    normalized.push_str(path);
    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

//! Fuzz target for request fingerprints
//!
//! URL normalization must not panic on arbitrary input. Whitespace
//! normalization must be idempotent, and fingerprints of a text and its
//! normalized form must agree.
//!
//! Run with: cargo +nightly fuzz run fingerprint_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadloom_core::{normalize_url, normalize_whitespace, ContentSource, Fingerprint};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let url = normalize_url(input);
    assert!(url.len() <= input.len());

    let text = normalize_whitespace(input);
    assert_eq!(normalize_whitespace(&text), text);

    let raw = Fingerprint::for_source(&ContentSource::Text(input.to_string()), 280, false);
    let normalized = Fingerprint::for_source(&ContentSource::Text(text), 280, false);
    assert_eq!(raw, normalized);
    assert_eq!(raw.as_str().len(), 64);
});

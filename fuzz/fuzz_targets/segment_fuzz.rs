//! Fuzz target for the segmenter
//!
//! Feeds arbitrary text and post lengths through `segment_with` and checks
//! that every successful result is well formed.
//!
//! Run with: cargo +nightly fuzz run segment_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadloom_core::normalize_whitespace;
use threadloom_segment::{segment_with, SegmentOptions};

fuzz_target!(|data: &[u8]| {
    let Some((&head, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };

    let max_length = 16 + usize::from(head & 0x7f);
    let numbered = head & 0x80 != 0;
    let options = SegmentOptions::new(max_length).with_numbering(numbered);

    match segment_with(text, &options) {
        Ok(segments) => {
            assert!(!segments.is_empty());
            let total = segments.len();
            for (i, seg) in segments.iter().enumerate() {
                assert_eq!(seg.index, i + 1);
                assert_eq!(seg.total, total);
                assert_eq!(seg.length, seg.text.chars().count());
                assert!(seg.length <= max_length);
            }
            assert_eq!(segment_with(text, &options).ok(), Some(segments));
        }
        Err(_) => assert!(normalize_whitespace(text).is_empty()),
    }
});

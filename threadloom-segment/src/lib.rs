//! Threadloom Segment - Thread Segmentation
//!
//! Turns arbitrary prose into an ordered, bounded sequence of posts.
//! Pure and deterministic: identical input and options always produce an
//! identical sequence, which is what makes request fingerprints meaningful
//! as cache keys.
//!
//! # Algorithm
//!
//! 1. Collapse whitespace. Empty input is rejected.
//! 2. Split into sentences; any sentence longer than the budget is split into
//!    clauses; any clause still too long is packed word by word; any single
//!    word longer than the budget is cut at a character boundary (logged).
//! 3. Pack the resulting units greedily, joining with one space, closing the
//!    current post whenever the next unit would overflow it.
//! 4. Number the posts once the total is known.

pub mod boundaries;

use threadloom_core::{normalize_whitespace, Segment, ThreadloomResult, ValidationError};

use boundaries::{ends_clause, ends_sentence, group_words, joined_len};

/// Separator placed between packed units.
const SEPARATOR: &str = " ";

/// Options controlling how text is segmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Maximum post length in characters, numbering included.
    pub max_length: usize,
    /// Append ` {index}/{total}` to every post.
    pub numbered: bool,
}

impl SegmentOptions {
    /// Plain posts of at most `max_length` characters.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            numbered: false,
        }
    }

    /// Enable or disable numbering suffixes.
    pub fn with_numbering(mut self, numbered: bool) -> Self {
        self.numbered = numbered;
        self
    }
}

/// Segment `text` into posts of at most `max_length` characters.
pub fn segment(text: &str, max_length: usize) -> ThreadloomResult<Vec<Segment>> {
    segment_with(text, &SegmentOptions::new(max_length))
}

/// Segment `text` according to `options`.
///
/// Fails with a validation error, and produces no partial output, when the
/// text is empty after normalization or the length leaves no room for text.
pub fn segment_with(text: &str, options: &SegmentOptions) -> ThreadloomResult<Vec<Segment>> {
    if options.max_length == 0 {
        return Err(ValidationError::InvalidMaxLength {
            max_length: options.max_length,
            minimum: 1,
        }
        .into());
    }

    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Err(ValidationError::EmptyText.into());
    }
    let words: Vec<&str> = normalized.split(' ').collect();

    if !options.numbered {
        let posts = pack(&words, options.max_length);
        return Ok(number(posts, false));
    }

    // The suffix width depends on the total, which depends on the budget left
    // after the suffix. More reserved width never yields fewer posts, so
    // growing the digit count until it covers the total terminates.
    let mut digits = 1;
    loop {
        let reserve = suffix_width(digits);
        if reserve >= options.max_length {
            return Err(ValidationError::InvalidMaxLength {
                max_length: options.max_length,
                minimum: reserve + 1,
            }
            .into());
        }

        let posts = pack(&words, options.max_length - reserve);
        let needed = digit_count(posts.len());
        if needed <= digits {
            return Ok(number(posts, true));
        }
        digits = needed;
    }
}

/// Greedily pack words into posts of at most `budget` characters.
fn pack(words: &[&str], budget: usize) -> Vec<String> {
    let mut posts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for unit in units(words, budget) {
        let unit_len = unit.chars().count();
        if current.is_empty() {
            current = unit;
            current_len = unit_len;
        } else if current_len + SEPARATOR.len() + unit_len <= budget {
            current.push_str(SEPARATOR);
            current.push_str(&unit);
            current_len += SEPARATOR.len() + unit_len;
        } else {
            posts.push(std::mem::replace(&mut current, unit));
            current_len = unit_len;
        }
    }
    if !current.is_empty() {
        posts.push(current);
    }
    posts
}

/// Break words into atomic units that each fit within `budget`.
fn units(words: &[&str], budget: usize) -> Vec<String> {
    let mut out = Vec::new();
    for sentence in group_words(words, ends_sentence) {
        if joined_len(&sentence) <= budget {
            out.push(sentence.join(SEPARATOR));
            continue;
        }
        for clause in group_words(&sentence, ends_clause) {
            if joined_len(&clause) <= budget {
                out.push(clause.join(SEPARATOR));
            } else {
                split_clause(&clause, budget, &mut out);
            }
        }
    }
    out
}

/// Split an oversized clause at the last whitespace that keeps each piece
/// within `budget`, cutting inside a word only when the word alone overflows.
fn split_clause(words: &[&str], budget: usize, out: &mut Vec<String>) {
    let mut piece: Vec<&str> = Vec::new();
    for &word in words {
        let word_len = word.chars().count();
        if word_len > budget {
            if !piece.is_empty() {
                out.push(piece.join(SEPARATOR));
                piece.clear();
            }
            tracing::warn!(
                word_chars = word_len,
                budget,
                "Token longer than post budget, cutting mid-word"
            );
            out.extend(hard_cut(word, budget));
            continue;
        }

        let mut candidate = piece.clone();
        candidate.push(word);
        if joined_len(&candidate) <= budget {
            piece = candidate;
        } else {
            out.push(piece.join(SEPARATOR));
            piece = vec![word];
        }
    }
    if !piece.is_empty() {
        out.push(piece.join(SEPARATOR));
    }
}

/// Cut `word` into runs of exactly `budget` characters plus a remainder,
/// never splitting a character.
fn hard_cut(word: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(budget)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn number(posts: Vec<String>, numbered: bool) -> Vec<Segment> {
    let total = posts.len();
    posts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let index = i + 1;
            if numbered {
                Segment::numbered(index, total, &text)
            } else {
                Segment::new(index, total, text)
            }
        })
        .collect()
}

/// Width of ` {index}/{total}` when both numbers have at most `digits` digits.
fn suffix_width(digits: usize) -> usize {
    2 + 2 * digits
}

fn digit_count(n: usize) -> usize {
    n.max(1).to_string().len()
}

//! Sentence and clause boundary detection over whitespace-normalized text.
//!
//! Boundaries are found at word granularity, so no unit produced here ever
//! starts or ends in the middle of a word.

/// Characters that may trail a terminator without hiding it (`end."` or `(sic.)`).
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201D}', '\u{2019}', '\u{00BB}'];

const SENTENCE_ENDS: &[char] = &['.', '!', '?', '\u{2026}'];

const CLAUSE_ENDS: &[char] = &[',', ';', ':', '\u{2014}', '\u{2013}'];

fn last_significant(word: &str) -> Option<char> {
    word.trim_end_matches(CLOSERS).chars().last()
}

/// Whether `word` closes a sentence.
pub fn ends_sentence(word: &str) -> bool {
    last_significant(word).is_some_and(|c| SENTENCE_ENDS.contains(&c))
}

/// Whether `word` closes a clause (sentence ends included).
pub fn ends_clause(word: &str) -> bool {
    ends_sentence(word)
        || word == "-"
        || last_significant(word).is_some_and(|c| CLAUSE_ENDS.contains(&c))
}

/// Group words into runs, closing a run after every word `is_end` accepts.
pub fn group_words<'a>(words: &[&'a str], is_end: fn(&str) -> bool) -> Vec<Vec<&'a str>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for &word in words {
        current.push(word);
        if is_end(word) {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Length in characters of `words` joined by single spaces.
pub fn joined_len(words: &[&str]) -> usize {
    let chars: usize = words.iter().map(|w| w.chars().count()).sum();
    chars + words.len().saturating_sub(1)
}

//! Character-aware text helpers shared by the memory components.
//!
//! All lengths and positions here count Unicode scalar values, not bytes,
//! because chapter prose is overwhelmingly CJK.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Runs of two or more CJK unified ideographs.
    static ref CJK_RUN: Regex = Regex::new(r"[\x{4E00}-\x{9FA5}]{2,}").expect("static pattern");
}

/// Truncate to `max` characters, appending `...` only when something was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let truncated: String = text.chars().take(max).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

/// Character index of the first occurrence of `needle` in `haystack`.
pub fn char_position(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .find(needle)
        .map(|byte_index| haystack[..byte_index].chars().count())
}

/// Whether `c` is a CJK unified ideograph in the basic block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

/// Count of CJK ideographs in `text`.
pub fn cjk_count(text: &str) -> usize {
    text.chars().filter(|c| is_cjk(*c)).count()
}

/// All maximal CJK runs of length two or more, in order of appearance.
pub fn cjk_runs(text: &str) -> impl Iterator<Item = &str> {
    CJK_RUN.find_iter(text).map(|m| m.as_str())
}

/// Case-insensitive substring match.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

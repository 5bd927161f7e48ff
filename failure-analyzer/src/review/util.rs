//! Small char-boundary-safe string helpers shared across the pipeline.

/// Last `max_chars` characters of `s` (whole string if shorter).
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// First `max_chars` characters of `s` (whole string if shorter).
pub fn head_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Rough token estimate (4 chars per token).
pub fn approx_tokens(s: &str) -> usize {
    s.chars().count().div_ceil(4)
}

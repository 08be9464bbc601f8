//! Text utilities for length-limited message bodies
//!
//! Platform limits count characters, not bytes. Every helper here works in
//! chars and only ever cuts on a char boundary.

use std::borrow::Cow;

/// Appended when a body had to be cut to fit
pub const TRUNCATION_MARKER: &str = "\n…truncated";

/// Number of chars in `s`
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset just past the first `max_chars` chars of `s`
pub fn byte_offset(s: &str, max_chars: usize) -> usize {
    s.char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

/// First `max_chars` chars of `s`
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    &s[..byte_offset(s, max_chars)]
}

/// Truncate to `limit` chars, appending `marker` inside the limit when cut.
///
/// Returns `Cow::Borrowed` if no truncation needed. When the limit is too
/// small to hold the marker the text is cut without it.
pub fn truncate_with_marker<'a>(s: &'a str, limit: usize, marker: &str) -> Cow<'a, str> {
    if char_len(s) <= limit {
        return Cow::Borrowed(s);
    }

    let marker_len = char_len(marker);
    if limit <= marker_len {
        return Cow::Borrowed(take_chars(s, limit));
    }

    let kept = take_chars(s, limit - marker_len);
    Cow::Owned(format!("{}{}", kept, marker))
}

/// Truncate with the standard [`TRUNCATION_MARKER`]
pub fn truncate(s: &str, limit: usize) -> Cow<'_, str> {
    truncate_with_marker(s, limit, TRUNCATION_MARKER)
}

//! Utility
//!
//! **This module is exempt from the API stability guarantee.** It's exposed
//! only for testing and diagnostics.
mod prio_bitmap;
pub use self::prio_bitmap::*;

/// Truncate `s` to at most `max_len` bytes without splitting a character.
pub(crate) fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

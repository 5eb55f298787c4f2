//! Comparison-key normalization.

use unicode_normalization::UnicodeNormalization;

/// NFKC-normalize, trim, and drop every whitespace character.
///
/// Folds full-width/half-width variants and ideographic spaces (U+3000) so
/// "雲取山 " and "雲取山" compare equal.
pub fn normalize_text(text: &str) -> String {
    text.nfkc().filter(|c| !c.is_whitespace()).collect()
}

/// First `max_chars` characters of `text`.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

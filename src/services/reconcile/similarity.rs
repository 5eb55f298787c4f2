//! Fuzzy string scores in `[0, 1]`.
//!
//! Inputs are space-joined token strings produced by the decomposer. Equal
//! strings (including two empty ones) score 1.0; an empty string against a
//! non-empty one scores 0.0.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

/// Plain edit-distance similarity.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b)
}

/// Best [`ratio`] of the shorter string against equal-length windows of the longer.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };

    let needle: String = short.iter().collect();
    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let candidate: String = window.iter().collect();
        let score = ratio(&needle, &candidate);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Order-insensitive ratio: tokens are sorted before comparing.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

struct TokenSets<'a> {
    common: Vec<&'a str>,
    only_a: Vec<&'a str>,
    only_b: Vec<&'a str>,
}

fn token_sets<'a>(a: &'a str, b: &'a str) -> TokenSets<'a> {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    TokenSets {
        common: set_a.intersection(&set_b).copied().collect(),
        only_a: set_a.difference(&set_b).copied().collect(),
        only_b: set_b.difference(&set_a).copied().collect(),
    }
}

fn join_parts(head: &[&str], tail: &[&str]) -> String {
    head.iter().chain(tail.iter()).copied().collect::<Vec<_>>().join(" ")
}

/// Set-overlap ratio. A token subset of the other side scores 1.0.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let sets = token_sets(a, b);
    if sets.common.is_empty() && (sets.only_a.is_empty() || sets.only_b.is_empty()) {
        return 0.0;
    }
    if !sets.common.is_empty() && (sets.only_a.is_empty() || sets.only_b.is_empty()) {
        return 1.0;
    }

    let base = sets.common.join(" ");
    let with_a = join_parts(&sets.common, &sets.only_a);
    let with_b = join_parts(&sets.common, &sets.only_b);

    let mut best = ratio(&with_a, &with_b);
    if !base.is_empty() {
        best = best.max(ratio(&base, &with_a)).max(ratio(&base, &with_b));
    }
    best
}

/// Like [`token_set_ratio`], but the leftover tokens are compared with
/// [`partial_ratio`]. Any shared token scores 1.0.
pub fn partial_token_set_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let sets = token_sets(a, b);
    if !sets.common.is_empty() {
        return 1.0;
    }
    partial_ratio(&sets.only_a.join(" "), &sets.only_b.join(" "))
}

/// Best of several strategies, scaled by how different the lengths are.
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    const UNBASE_SCALE: f64 = 0.95;
    let len_a = a.chars().count() as f64;
    let len_b = b.chars().count() as f64;
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);

    let base = ratio(a, b);
    if len_ratio < 1.5 {
        let tokens = token_sort_ratio(a, b).max(token_set_ratio(a, b)) * UNBASE_SCALE;
        return base.max(tokens);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    let partial = partial_ratio(a, b) * partial_scale;
    let tokens = partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
        .max(partial_token_set_ratio(a, b))
        * UNBASE_SCALE
        * partial_scale;
    base.max(partial).max(tokens)
}

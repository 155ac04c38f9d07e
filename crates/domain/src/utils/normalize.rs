//! Field normalization and fingerprinting
//!
//! Both sync directions compare field values through the same normalization
//! so formatting drift never produces spurious diffs. The rules are:
//!
//! 1. Leading and trailing whitespace is trimmed.
//! 2. Internal whitespace runs collapse to a single ASCII space.
//! 3. Comparison is case-insensitive; fingerprints hash the lowercased
//!    normalized form.
//!
//! A product's fingerprint is a blake3 hash over `key=value` lines of its
//! normalized fields in key order, so any map with equal normalized content
//! hashes identically regardless of insertion order.

use std::collections::BTreeMap;

/// Normalize a raw field value for comparison and hashing
pub fn normalize_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        }
    }

    out
}

/// Check two raw field values for normalized equality
pub fn values_equal(a: &str, b: &str) -> bool {
    normalize_value(a) == normalize_value(b)
}

/// Compute the fingerprint hash over a product's fields
pub fn fingerprint_fields(fields: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in fields {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(normalize_value(value).as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize().as_bytes())
}

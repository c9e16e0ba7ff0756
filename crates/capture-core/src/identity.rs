//! Content identity hashing.
//!
//! Two hashes identify captured content:
//!
//! - A keyword fingerprint (blake3) names a keyword-tier topic
//! - A dedupe key (SHA-256) names "this passage, to this notebook, today"
//!
//! Both are pure functions of their inputs so the same content always maps
//! to the same identity.

use chrono::{DateTime, FixedOffset, Utc};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from a keyword fingerprint.
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Fingerprints a keyword set independently of its order.
///
/// Keywords are lowercased, sorted and de-duplicated before hashing.
///
/// # Example
///
/// ```
/// use capture_core::identity::keyword_fingerprint;
///
/// let a = keyword_fingerprint(&["rust", "ownership"]);
/// let b = keyword_fingerprint(&["Ownership", "rust"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 16);
/// ```
pub fn keyword_fingerprint<S: AsRef<str>>(keywords: &[S]) -> String {
    let mut sorted: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    sorted.sort();
    sorted.dedup();

    let hash = blake3::hash(sorted.join("|").as_bytes());
    hash.to_hex()[..FINGERPRINT_HEX_LEN].to_string()
}

/// Hex SHA-256 of a string.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Calendar day (`YYYY-MM-DD`) of `at` in the given local offset.
pub fn local_day_key(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

/// Builds the dedupe key for a capture headed to a notebook.
///
/// Identical `(url, selected_text, notebook_ref)` on the same local day
/// always yields the same key.
pub fn dedupe_key(
    url: &str,
    selected_text: &str,
    notebook_ref: &str,
    captured_at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let material = format!(
        "{}\n{}\n{}\n{}",
        url,
        sha256_hex(selected_text),
        local_day_key(captured_at, offset),
        notebook_ref
    );
    sha256_hex(&material)
}

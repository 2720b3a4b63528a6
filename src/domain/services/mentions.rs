//! # Mention Normalization
//!
//! Normalizes raw mention tokens from human-authored comments.
//!
//! Each token is trimmed, a single leading `@` is stripped, the remainder is
//! trimmed again and lowercased. Empty results are dropped and duplicates
//! removed, keeping first-seen order. This is identifier normalization only;
//! no user lookup happens here.
//!
//! # Examples
//!
//! ```
//! use rfq_dispatch::domain::services::mentions::normalize_mentions;
//!
//! let raw = [" User@Test.com ", "@user@test.com", "", "  ", "2", "2"];
//! assert_eq!(normalize_mentions(raw), vec!["user@test.com", "2"]);
//! ```

use std::collections::HashSet;

/// Normalizes a sequence of raw mention tokens.
#[must_use]
pub fn normalize_mentions<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|token| normalize_one(token.as_ref()))
        .filter(|mention| seen.insert(mention.clone()))
        .collect()
}

fn normalize_one(token: &str) -> Option<String> {
    let trimmed = token.trim();
    let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    (!stripped.is_empty()).then(|| stripped.to_lowercase())
}

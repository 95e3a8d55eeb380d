//! Normalization helpers for entity fingerprints.
//!
//! A fingerprint is only a fallback match key during merge. Two payloads that
//! differ in case, surrounding whitespace or the order of checklist entries
//! produce the same key.
//!
//! Parts and checklist entries are JSON-encoded before hashing, so user text
//! containing separators cannot shift content from one field into another.

use chrono::NaiveDate;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Stand-in for absent dates and numbers.
pub const MISSING: &str = "0";

/// Trimmed, lower-cased text.
pub fn text(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn date(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

pub fn number<T: ToString>(value: Option<T>) -> String {
    value
        .map(|n| n.to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// Normalized `[title, completed]` checklist entry.
pub fn pair(title: &str, completed: bool) -> String {
    Value::from(vec![Value::from(text(title)), Value::from(completed)]).to_string()
}

/// Sorts already-normalized entries so collection order does not matter.
pub fn unordered<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut items: Vec<String> = items.into_iter().collect();
    items.sort();
    Value::from(items).to_string()
}

/// Hashes the parts, encoded as a JSON array, into a fixed-width hex key.
pub fn digest(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Value::from(parts.to_vec()).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

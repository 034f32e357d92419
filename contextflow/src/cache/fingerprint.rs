//! Deterministic cache keys.

use crate::context::CONTEXT_KEY;
use crate::core::QUERY_KEY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

static WHITESPACE: OnceLock<regex::Regex> = OnceLock::new();

/// Normalizes a free-text query: trimmed, lowercased, runs of whitespace
/// collapsed to a single space.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    let whitespace = WHITESPACE.get_or_init(|| regex::Regex::new(r"\s+").expect("valid pattern"));
    whitespace
        .replace_all(query.trim(), " ")
        .to_lowercase()
}

/// Hex-encoded SHA-256 of a normalized query plus its relevant parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint for a tool call.
    ///
    /// When `relevant_keys` is empty every parameter except the reserved
    /// context key contributes; otherwise only the listed keys do. A `query`
    /// parameter only contributes through its normalized form. Object keys
    /// are sorted recursively, so parameter order never changes the result.
    #[must_use]
    pub fn compute(
        tool_name: &str,
        query: Option<&str>,
        parameters: &Map<String, Value>,
        relevant_keys: &[String],
    ) -> Self {
        let selected: Map<String, Value> = parameters
            .iter()
            .filter(|(key, _)| key.as_str() != CONTEXT_KEY)
            .filter(|(key, _)| query.is_none() || key.as_str() != QUERY_KEY)
            .filter(|(key, _)| relevant_keys.is_empty() || relevant_keys.iter().any(|k| k == *key))
            .map(|(key, value)| (key.clone(), canonicalize(value)))
            .collect();

        let material = serde_json::json!({
            "tool": tool_name,
            "query": query.map(normalize_query),
            "params": canonicalize(&Value::Object(selected)),
        });

        let mut hasher = Sha256::new();
        hasher.update(material.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already computed key.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Rust   Async\tTips \n"), "rust async tips");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_equivalent_queries_share_a_fingerprint() {
        let p = params(json!({"limit": 10}));
        let a = Fingerprint::compute("search_prompts", Some("Rust  Tips"), &p, &[]);
        let b = Fingerprint::compute("search_prompts", Some(" rust tips"), &p, &[]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_raw_query_parameter_is_not_hashed() {
        let a = params(json!({"query": "Rust  Tips", "limit": 10}));
        let b = params(json!({"query": "rust tips", "limit": 10}));
        assert_eq!(
            Fingerprint::compute("search_prompts", a["query"].as_str(), &a, &[]),
            Fingerprint::compute("search_prompts", b["query"].as_str(), &b, &[])
        );

        let relevant = vec!["query".to_string(), "limit".to_string()];
        assert_eq!(
            Fingerprint::compute("search_prompts", a["query"].as_str(), &a, &relevant),
            Fingerprint::compute("search_prompts", b["query"].as_str(), &b, &relevant)
        );
    }

    #[test]
    fn test_parameter_order_is_irrelevant() {
        let a = params(json!({"a": 1, "b": {"y": 2, "x": 1}}));
        let b = params(json!({"b": {"x": 1, "y": 2}, "a": 1}));
        assert_eq!(
            Fingerprint::compute("t", None, &a, &[]),
            Fingerprint::compute("t", None, &b, &[])
        );
    }

    #[test]
    fn test_relevant_keys_restrict_material() {
        let relevant = vec!["category".to_string()];
        let a = params(json!({"category": "writing", "page": 1}));
        let b = params(json!({"category": "writing", "page": 2}));
        assert_eq!(
            Fingerprint::compute("t", Some("q"), &a, &relevant),
            Fingerprint::compute("t", Some("q"), &b, &relevant)
        );
        assert_ne!(
            Fingerprint::compute("t", Some("q"), &a, &[]),
            Fingerprint::compute("t", Some("q"), &b, &[])
        );
    }

    #[test]
    fn test_context_key_is_ignored() {
        let plain = params(json!({"limit": 5}));
        let enriched = params(json!({"limit": 5, "_context": {"memory": [1, 2]}}));
        assert_eq!(
            Fingerprint::compute("t", Some("q"), &plain, &[]),
            Fingerprint::compute("t", Some("q"), &enriched, &[])
        );
    }

    #[test]
    fn test_tool_name_distinguishes() {
        let p = Map::new();
        assert_ne!(
            Fingerprint::compute("search_prompts", Some("q"), &p, &[]),
            Fingerprint::compute("recommend_prompts", Some("q"), &p, &[])
        );
    }
}

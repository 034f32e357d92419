//! Tool descriptors and call payloads.

use crate::cache::CacheInvalidator;
use crate::context::ParameterSchema;
use crate::core::ScopeId;
use crate::memory::MemoryKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Broad category of a tool, used for caching and memory tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Read-only lookup.
    Search,
    /// Mutates stored entities.
    Store,
    /// Read-only suggestion.
    Recommend,
    /// Anything else.
    Other,
}

impl ToolKind {
    /// Returns true for kinds whose results are cached by default.
    #[must_use]
    pub fn cacheable_by_default(self) -> bool {
        matches!(self, Self::Search | Self::Recommend)
    }

    /// Returns the memory kind recorded for this tool's outcomes.
    #[must_use]
    pub fn memory_kind(self) -> MemoryKind {
        match self {
            Self::Search => MemoryKind::Search,
            Self::Store => MemoryKind::Store,
            Self::Recommend => MemoryKind::Recommend,
            Self::Other => MemoryKind::Custom("tool".to_string()),
        }
    }
}

/// Static description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// The tool name.
    pub name: String,
    /// The tool category.
    pub kind: ToolKind,
    /// Whether results go through the result cache.
    pub cacheable: bool,
    /// TTL for cached results; the cache default applies when unset.
    pub cache_ttl: Option<Duration>,
    /// Parameters that contribute to the cache key. Empty means all.
    pub relevant_keys: Vec<String>,
    /// Field of each result item whose value tags the cache entry.
    pub entity_field: Option<String>,
    /// Parameter schema checked at context build.
    pub schema: Option<ParameterSchema>,
}

impl ToolDescriptor {
    /// Creates a descriptor with kind-based defaults.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ToolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cacheable: kind.cacheable_by_default(),
            cache_ttl: None,
            relevant_keys: Vec::new(),
            entity_field: None,
            schema: None,
        }
    }

    /// Creates a search tool descriptor.
    #[must_use]
    pub fn search(name: impl Into<String>) -> Self {
        Self::new(name, ToolKind::Search)
    }

    /// Creates a store tool descriptor.
    #[must_use]
    pub fn store(name: impl Into<String>) -> Self {
        Self::new(name, ToolKind::Store)
    }

    /// Creates a recommend tool descriptor.
    #[must_use]
    pub fn recommend(name: impl Into<String>) -> Self {
        Self::new(name, ToolKind::Recommend)
    }

    /// Overrides cacheability.
    #[must_use]
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Sets the cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Restricts the cache key to these parameters.
    #[must_use]
    pub fn with_relevant_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the result field used to tag cache entries.
    #[must_use]
    pub fn with_entity_field(mut self, field: impl Into<String>) -> Self {
        self.entity_field = Some(field.into());
        self
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Collects entity tags from a result.
    ///
    /// An array contributes the entity field of each object element; an object
    /// contributes its own entity field. Strings are used as-is, other scalars
    /// by their JSON text.
    #[must_use]
    pub fn tags_for(&self, result: &Value) -> BTreeSet<String> {
        let Some(field) = self.entity_field.as_deref() else {
            return BTreeSet::new();
        };
        let items: Vec<&Value> = match result {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        items
            .into_iter()
            .filter_map(|item| item.get(field))
            .filter_map(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// Everything a handler receives for one invocation.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// The tool name.
    pub tool_name: String,
    /// The calling scope.
    pub scope_id: ScopeId,
    /// The tracked execution.
    pub execution_id: Uuid,
    /// Enriched parameters, or the caller's parameters when enrichment did not apply.
    pub parameters: Map<String, Value>,
    /// When the orchestrator stops waiting for this call.
    pub deadline: Instant,
    /// Hook for dropping cached results the call makes stale.
    pub invalidator: CacheInvalidator,
}

impl ToolCall {
    /// Returns a parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_defaults() {
        assert!(ToolDescriptor::search("s").cacheable);
        assert!(ToolDescriptor::recommend("r").cacheable);
        assert!(!ToolDescriptor::store("w").cacheable);
        assert!(!ToolDescriptor::new("o", ToolKind::Other).cacheable);
        assert_eq!(ToolKind::Store.memory_kind(), MemoryKind::Store);
    }

    #[test]
    fn test_tags_from_array_result() {
        let descriptor = ToolDescriptor::search("search_prompts").with_entity_field("id");
        let tags = descriptor.tags_for(&json!([{"id": "p1"}, {"id": 2}, {"title": "no id"}]));
        assert_eq!(tags, BTreeSet::from(["p1".to_string(), "2".to_string()]));
    }

    #[test]
    fn test_tags_from_object_result() {
        let descriptor = ToolDescriptor::recommend("recommend").with_entity_field("promptId");
        let tags = descriptor.tags_for(&json!({"promptId": "p9", "score": 0.4}));
        assert_eq!(tags.len(), 1);
        assert!(tags.contains("p9"));
    }

    #[test]
    fn test_no_entity_field_no_tags() {
        assert!(ToolDescriptor::search("s").tags_for(&json!([{"id": 1}])).is_empty());
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(serde_json::to_string(&ToolKind::Recommend).unwrap(), r#""recommend""#);
    }
}

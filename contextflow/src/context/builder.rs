//! Merges request parameters with scope memory.

use super::{ParameterError, ParameterSchema};
use crate::core::ContextRequest;
use crate::memory::MemoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Reserved parameter key that carries merged memory.
pub const CONTEXT_KEY: &str = "_context";

/// Request parameters after enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedContext {
    /// Caller parameters plus the reserved context key when memory was merged.
    pub parameters: Map<String, Value>,
    /// Number of memory entries merged.
    pub memory_count: usize,
}

impl EnrichedContext {
    /// Returns true if memory was actually merged into the parameters.
    #[must_use]
    pub fn has_memory(&self) -> bool {
        self.memory_count > 0
    }

    /// Returns the merged memory entries, newest first.
    #[must_use]
    pub fn memory_context(&self) -> &[Value] {
        self.parameters
            .get(CONTEXT_KEY)
            .and_then(|ctx| ctx.get("memoryContext"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Builds an [`EnrichedContext`] from a request and a memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct UnifiedContextBuilder {
    max_memory_items: Option<usize>,
}

impl UnifiedContextBuilder {
    /// Creates a builder that merges the whole snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many snapshot entries are merged.
    #[must_use]
    pub fn with_max_memory_items(mut self, max: usize) -> Self {
        self.max_memory_items = Some(max);
        self
    }

    /// Merges the snapshot (expected newest first) under [`CONTEXT_KEY`].
    ///
    /// Caller keys are never overwritten: if the caller already supplied the
    /// reserved key, the parameters pass through unchanged and no memory is
    /// merged. An empty snapshot also leaves the parameters unchanged.
    #[must_use]
    pub fn build(&self, request: &ContextRequest, snapshot: &[MemoryEntry]) -> EnrichedContext {
        let mut parameters = request.parameters().clone();

        if parameters.contains_key(CONTEXT_KEY) {
            debug!(
                scope = %request.scope_id(),
                tool = request.tool_name(),
                "Caller supplied the reserved context key; skipping memory merge"
            );
            return EnrichedContext {
                parameters,
                memory_count: 0,
            };
        }

        let take = self.max_memory_items.unwrap_or(usize::MAX);
        let memory: Vec<Value> = snapshot.iter().take(take).map(compact_entry).collect();
        let memory_count = memory.len();

        if memory_count > 0 {
            parameters.insert(
                CONTEXT_KEY.to_string(),
                json!({
                    "scopeId": request.scope_id().as_str(),
                    "memoryCount": memory_count,
                    "memoryContext": memory,
                }),
            );
        }

        EnrichedContext {
            parameters,
            memory_count,
        }
    }

    /// Validates the caller parameters against `schema`, then builds.
    pub fn build_validated(
        &self,
        request: &ContextRequest,
        snapshot: &[MemoryEntry],
        schema: Option<&ParameterSchema>,
    ) -> Result<EnrichedContext, ParameterError> {
        if let Some(schema) = schema {
            schema.validate(request.parameters())?;
        }
        Ok(self.build(request, snapshot))
    }
}

fn compact_entry(entry: &MemoryEntry) -> Value {
    let mut compact = json!({
        "kind": entry.kind.as_str(),
        "payload": entry.payload,
        "createdAt": entry.created_at.to_rfc3339(),
    });
    if let (Some(score), Some(map)) = (entry.relevance_hint, compact.as_object_mut()) {
        map.insert("relevanceHint".to_string(), json!(score));
    }
    compact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParamType;
    use crate::core::ScopeId;
    use pretty_assertions::assert_eq;

    fn request() -> ContextRequest {
        ContextRequest::new(ScopeId::session("s"), "search_prompts")
            .with_parameter("query", json!("rust"))
    }

    fn snapshot() -> Vec<MemoryEntry> {
        vec![
            MemoryEntry::new(ScopeId::session("s"), "search", json!({"query": "newest"}))
                .with_relevance(0.9),
            MemoryEntry::new(ScopeId::session("s"), "store", json!({"id": 1})),
        ]
    }

    #[test]
    fn test_merges_memory_under_reserved_key() {
        let enriched = UnifiedContextBuilder::new().build(&request(), &snapshot());

        assert_eq!(enriched.memory_count, 2);
        assert_eq!(enriched.parameters["query"], json!("rust"));
        let memory = enriched.memory_context();
        assert_eq!(memory[0]["kind"], json!("search"));
        assert_eq!(memory[0]["relevanceHint"], json!(0.9));
        assert!(memory[1].get("relevanceHint").is_none());
    }

    #[test]
    fn test_empty_snapshot_leaves_parameters() {
        let enriched = UnifiedContextBuilder::new().build(&request(), &[]);
        assert!(!enriched.has_memory());
        assert_eq!(&enriched.parameters, request().parameters());
    }

    #[test]
    fn test_caller_context_key_is_preserved() {
        let request = request().with_parameter(CONTEXT_KEY, json!("mine"));
        let enriched = UnifiedContextBuilder::new().build(&request, &snapshot());

        assert_eq!(enriched.parameters[CONTEXT_KEY], json!("mine"));
        assert_eq!(enriched.memory_count, 0);
    }

    #[test]
    fn test_max_memory_items() {
        let enriched = UnifiedContextBuilder::new()
            .with_max_memory_items(1)
            .build(&request(), &snapshot());
        assert_eq!(enriched.memory_count, 1);
        assert_eq!(enriched.memory_context()[0]["payload"]["query"], json!("newest"));
    }

    #[test]
    fn test_schema_violation_fails_build() {
        let schema = ParameterSchema::new().required("category", ParamType::String);
        let err = UnifiedContextBuilder::new()
            .build_validated(&request(), &snapshot(), Some(&schema))
            .unwrap_err();
        assert_eq!(err, ParameterError::Missing("category".to_string()));
    }
}

//! Memory entry types.

use crate::core::ScopeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Tag describing where a memory entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryKind {
    /// Outcome of a search tool.
    Search,
    /// Outcome of a store (write) tool.
    Store,
    /// Explicit user feedback.
    Feedback,
    /// Outcome of a recommendation tool.
    Recommend,
    /// Any other origin.
    Custom(String),
}

impl MemoryKind {
    /// Returns the tag string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Search => "search",
            Self::Store => "store",
            Self::Feedback => "feedback",
            Self::Recommend => "recommend",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for MemoryKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "search" => Self::Search,
            "store" => Self::Store,
            "feedback" => Self::Feedback,
            "recommend" => Self::Recommend,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for MemoryKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<MemoryKind> for String {
    fn from(kind: MemoryKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remembered interaction, owned by the store of its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// The owning scope.
    pub scope_id: ScopeId,
    /// Creation time; never earlier than the scope's previous entry once stored.
    pub created_at: DateTime<Utc>,
    /// Origin tag.
    pub kind: MemoryKind,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// Optional relevance score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_hint: Option<f64>,
}

impl MemoryEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(scope_id: ScopeId, kind: impl Into<MemoryKind>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            scope_id,
            created_at: Utc::now(),
            kind: kind.into(),
            payload,
            relevance_hint: None,
        }
    }

    /// Sets the relevance hint.
    #[must_use]
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_hint = Some(score);
        self
    }

    /// Overrides the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Converts to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), serde_json::json!(self.id.to_string()));
        map.insert("scope_id".to_string(), serde_json::json!(self.scope_id.as_str()));
        map.insert("kind".to_string(), serde_json::json!(self.kind.as_str()));
        map.insert("payload".to_string(), self.payload.clone());
        map.insert("created_at".to_string(), serde_json::json!(self.created_at.to_rfc3339()));
        if let Some(score) = self.relevance_hint {
            map.insert("relevance_hint".to_string(), serde_json::json!(score));
        }
        map
    }
}

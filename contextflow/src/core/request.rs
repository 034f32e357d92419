//! Scope identifiers and tool requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter holding a request's free-text query.
pub const QUERY_KEY: &str = "query";

/// A session or user identifier under which memory and concurrency limits
/// are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Creates a scope from a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a session-scoped identifier.
    #[must_use]
    pub fn session(id: impl fmt::Display) -> Self {
        Self(format!("session:{id}"))
    }

    /// Creates a user-scoped identifier.
    #[must_use]
    pub fn user(id: impl fmt::Display) -> Self {
        Self(format!("user:{id}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A raw tool invocation entering the orchestrator.
///
/// Fields are private; the builder methods consume the request, so a value
/// handed to the orchestrator can no longer change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    scope_id: ScopeId,
    tool_name: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    requested_at: DateTime<Utc>,
}

impl ContextRequest {
    /// Creates a request with no parameters.
    #[must_use]
    pub fn new(scope_id: impl Into<ScopeId>, tool_name: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            tool_name: tool_name.into(),
            parameters: serde_json::Map::new(),
            requested_at: Utc::now(),
        }
    }

    /// Replaces the parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Map<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds a single parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Overrides the request timestamp.
    #[must_use]
    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }

    /// Builds a request from a JSON parameter value.
    ///
    /// `null` is treated as an empty parameter set; any other non-object
    /// value is rejected.
    pub fn from_value(
        scope_id: impl Into<ScopeId>,
        tool_name: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Result<Self, crate::errors::ContextflowError> {
        let tool_name = tool_name.into();
        let parameters = match parameters {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(crate::errors::ContextflowError::Serialization(format!(
                    "parameters for '{tool_name}' must be an object, got {other}"
                )))
            }
        };
        Ok(Self::new(scope_id, tool_name).with_parameters(parameters))
    }

    /// Returns the scope identifier.
    #[must_use]
    pub fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the raw parameter map.
    #[must_use]
    pub fn parameters(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.parameters
    }

    /// Returns a single parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }

    /// Returns the `query` parameter if it is a string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.parameters.get(QUERY_KEY).and_then(serde_json::Value::as_str)
    }

    /// Returns when the request was created.
    #[must_use]
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

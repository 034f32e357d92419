//! Error types for the contextflow orchestration core.
//!
//! Cache misses and missing pipeline configuration are ordinary control flow
//! and intentionally have no variant here: a miss is `None`, an unconfigured
//! tool falls back to the default pipeline.

use crate::core::ScopeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for contextflow operations.
#[derive(Debug, Error)]
pub enum ContextflowError {
    /// The scope already runs the maximum number of executions.
    #[error("{0}")]
    AdmissionRejected(#[from] AdmissionRejected),

    /// A stage exceeded its per-stage timeout.
    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    StageTimeout {
        /// The stage identifier.
        stage: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A non-tool stage failed.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed {
        /// The stage identifier.
        stage: String,
        /// Failure description.
        message: String,
    },

    /// The tool handler returned an error.
    #[error("Tool execution failed: {tool} - {message}")]
    ToolExecutionFailed {
        /// The tool name.
        tool: String,
        /// The handler's error, rendered with its cause chain.
        message: String,
    },

    /// No handler is registered for the tool.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The execution was cancelled.
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContextflowError {
    /// Creates a stage failure.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a tool execution failure.
    #[must_use]
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecutionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AdmissionRejected(_) | Self::StageTimeout { .. })
    }

    /// Returns the message reported to the caller.
    ///
    /// Tool failures carry the handler's own message; everything else uses
    /// the full display form.
    #[must_use]
    pub fn caller_message(&self) -> String {
        match self {
            Self::ToolExecutionFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns a stable error kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdmissionRejected(_) => "AdmissionRejected",
            Self::StageTimeout { .. } => "StageTimeout",
            Self::StageFailed { .. } => "StageFailed",
            Self::ToolExecutionFailed { .. } => "ToolExecutionFailed",
            Self::ToolNotFound(_) => "ToolNotFound",
            Self::Config(_) => "ConfigError",
            Self::Cancelled(_) => "Cancelled",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));

        match self {
            Self::AdmissionRejected(rejected) => {
                map.insert("scope".to_string(), serde_json::json!(rejected.scope.as_str()));
                map.insert("running".to_string(), serde_json::json!(rejected.running));
                map.insert("limit".to_string(), serde_json::json!(rejected.limit));
            }
            Self::StageTimeout { stage, timeout_ms } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
                map.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Self::StageFailed { stage, .. } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
            }
            Self::ToolExecutionFailed { tool, .. } => {
                map.insert("tool".to_string(), serde_json::json!(tool));
            }
            _ => {}
        }

        map
    }
}

impl From<serde_json::Error> for ContextflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised by the execution tracker when a scope is at its concurrency cap.
///
/// This is an admission-control decision, not a queue: the caller retries or
/// surfaces backpressure.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Admission rejected for scope '{scope}': {running}/{limit} executions already running")]
pub struct AdmissionRejected {
    /// The scope that hit its cap.
    pub scope: ScopeId,
    /// Running executions observed at the decision point.
    pub running: usize,
    /// The configured cap.
    pub limit: usize,
}

impl AdmissionRejected {
    /// Creates a new admission rejection.
    #[must_use]
    pub fn new(scope: ScopeId, running: usize, limit: usize) -> Self {
        Self {
            scope,
            running,
            limit,
        }
    }
}

/// Errors raised while loading or installing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A pipeline references a stage that has no registered implementation.
    #[error("Pipeline for tool '{tool}' references unknown stage '{stage}'")]
    UnknownStage {
        /// The tool whose pipeline is invalid.
        tool: String,
        /// The unresolved stage identifier.
        stage: String,
    },

    /// A pipeline is structurally invalid.
    #[error("Invalid pipeline for tool '{tool}': {reason}")]
    InvalidPipeline {
        /// The tool whose pipeline is invalid.
        tool: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid pipeline error.
    #[must_use]
    pub fn invalid_pipeline(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_rejected_display() {
        let err = AdmissionRejected::new(ScopeId::session("abc"), 3, 3);
        let msg = err.to_string();
        assert!(msg.contains("session:abc"));
        assert!(msg.contains("3/3"));
    }

    #[test]
    fn test_retryable_classification() {
        let rejected: ContextflowError =
            AdmissionRejected::new(ScopeId::user("u1"), 2, 2).into();
        assert!(rejected.is_retryable());

        let timeout = ContextflowError::StageTimeout {
            stage: "buildContext".to_string(),
            timeout_ms: 50,
        };
        assert!(timeout.is_retryable());

        let tool = ContextflowError::tool_failed("search", "db down");
        assert!(!tool.is_retryable());
    }

    #[test]
    fn test_caller_message_unwraps_tool_failures() {
        let tool = ContextflowError::tool_failed("store_prompt", "unique constraint violated");
        assert_eq!(tool.caller_message(), "unique constraint violated");
        assert_eq!(
            tool.to_string(),
            "Tool execution failed: store_prompt - unique constraint violated"
        );

        let missing = ContextflowError::ToolNotFound("x".to_string());
        assert_eq!(missing.caller_message(), "Tool not found: x");
    }

    #[test]
    fn test_error_to_dict() {
        let err = ContextflowError::StageTimeout {
            stage: "retrieveMemory".to_string(),
            timeout_ms: 100,
        };
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "StageTimeout");
        assert_eq!(dict.get("stage").unwrap(), "retrieveMemory");
        assert_eq!(dict.get("timeout_ms").unwrap(), 100);
    }

    #[test]
    fn test_config_error_from_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ConfigError = parse.unwrap_err().into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_config_error_wraps_into_contextflow_error() {
        let err: ContextflowError = ConfigError::invalid_pipeline("search", "empty").into();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("search"));
    }
}

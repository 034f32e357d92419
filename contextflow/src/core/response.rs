//! Response shape returned to tool callers.

use super::ResponseStatus;
use crate::errors::{AdmissionRejected, ContextflowError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single response produced for every tool invocation.
///
/// `context_enhanced` lets callers tell "tool succeeded without memory
/// context" apart from a fully enriched success; `status` tells both apart
/// from a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// Execution identifier; absent when admission was rejected.
    pub execution_id: Option<Uuid>,
    /// Terminal status.
    pub status: ResponseStatus,
    /// The tool's result, if it produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Whether the tool ran with merged memory context and no stage degraded.
    pub context_enhanced: bool,
    /// Best-effort quality indicator in `[0.0, 1.0]`.
    pub context_quality: f64,
    /// Stages that failed softly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<String>,
    /// Error message for failed, rejected or cancelled calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the caller may retry.
    #[serde(default)]
    pub retryable: bool,
}

impl ToolResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn succeeded(execution_id: Uuid, result: serde_json::Value) -> Self {
        Self {
            execution_id: Some(execution_id),
            status: ResponseStatus::Succeeded,
            result: Some(result),
            context_enhanced: false,
            context_quality: 0.0,
            degraded_stages: Vec::new(),
            error: None,
            retryable: false,
        }
    }

    /// Creates a failed response. A tool's own error message is passed
    /// through verbatim.
    #[must_use]
    pub fn failed(execution_id: Uuid, error: &ContextflowError) -> Self {
        Self {
            execution_id: Some(execution_id),
            status: ResponseStatus::Failed,
            result: None,
            context_enhanced: false,
            context_quality: 0.0,
            degraded_stages: Vec::new(),
            error: Some(error.caller_message()),
            retryable: error.is_retryable(),
        }
    }

    /// Creates a backpressure response.
    #[must_use]
    pub fn rejected(rejection: &AdmissionRejected) -> Self {
        Self {
            execution_id: None,
            status: ResponseStatus::Rejected,
            result: None,
            context_enhanced: false,
            context_quality: 0.0,
            degraded_stages: Vec::new(),
            error: Some(rejection.to_string()),
            retryable: true,
        }
    }

    /// Creates a cancellation response.
    #[must_use]
    pub fn cancelled(execution_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            execution_id: Some(execution_id),
            status: ResponseStatus::Cancelled,
            result: None,
            context_enhanced: false,
            context_quality: 0.0,
            degraded_stages: Vec::new(),
            error: Some(reason.into()),
            retryable: false,
        }
    }

    /// Sets the enrichment outcome.
    #[must_use]
    pub fn with_enrichment(mut self, enhanced: bool, quality: f64) -> Self {
        self.context_enhanced = enhanced;
        self.context_quality = quality.clamp(0.0, 1.0);
        self
    }

    /// Sets the degraded stage names.
    #[must_use]
    pub fn with_degraded_stages(mut self, stages: Vec<String>) -> Self {
        self.degraded_stages = stages;
        self
    }

    /// Returns true if the tool call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Succeeded
    }

    /// Returns true if the call was refused by admission control.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status == ResponseStatus::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScopeId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_succeeded_response() {
        let id = Uuid::now_v7();
        let response = ToolResponse::succeeded(id, json!({"items": []})).with_enrichment(true, 1.4);

        assert!(response.is_success());
        assert!(response.context_enhanced);
        assert!((response.context_quality - 1.0).abs() < f64::EPSILON);
        assert_eq!(response.execution_id, Some(id));
    }

    #[test]
    fn test_rejected_response_has_no_execution() {
        let rejection = AdmissionRejected::new(ScopeId::session("s"), 3, 3);
        let response = ToolResponse::rejected(&rejection);

        assert!(response.is_rejected());
        assert!(response.retryable);
        assert!(response.execution_id.is_none());
        assert!(response.result.is_none());
    }

    #[test]
    fn test_failed_response_keeps_error_verbatim() {
        let err = ContextflowError::tool_failed("store_prompt", "unique constraint violated");
        let response = ToolResponse::failed(Uuid::now_v7(), &err);

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("unique constraint violated"));
    }

    #[test]
    fn test_response_serialization_shape() {
        let response = ToolResponse::succeeded(Uuid::now_v7(), json!(1));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], json!("succeeded"));
        assert_eq!(value["contextEnhanced"], json!(false));
        assert!(value.get("executionId").is_some());
        assert!(value.get("degradedStages").is_none());
    }
}

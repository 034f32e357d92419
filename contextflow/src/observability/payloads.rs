//! Event payload builders.

use serde_json::{json, Value};
use uuid::Uuid;

/// Builds the payload of a `stage.*` event.
#[must_use]
pub fn stage_payload(
    execution_id: Uuid,
    tool_name: &str,
    stage: &str,
    index: usize,
    duration_ms: Option<f64>,
    outcome: Option<&str>,
    error: Option<&str>,
) -> Value {
    let mut payload = json!({
        "execution_id": execution_id.to_string(),
        "tool": tool_name,
        "stage": stage,
        "index": index,
    });
    if let Some(map) = payload.as_object_mut() {
        if let Some(duration_ms) = duration_ms {
            map.insert("duration_ms".to_string(), json!(duration_ms));
        }
        if let Some(outcome) = outcome {
            map.insert("outcome".to_string(), json!(outcome));
        }
        if let Some(error) = error {
            map.insert("error".to_string(), json!(error));
        }
    }
    payload
}

/// Builds the payload of an `execution.*` event.
#[must_use]
pub fn execution_payload(
    execution_id: Option<Uuid>,
    scope: &str,
    tool_name: &str,
    extra: Value,
) -> Value {
    let mut payload = json!({
        "execution_id": execution_id.map(|id| id.to_string()),
        "scope": scope,
        "tool": tool_name,
    });
    if let (Some(map), Value::Object(extra)) = (payload.as_object_mut(), extra) {
        map.extend(extra);
    }
    payload
}

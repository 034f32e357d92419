//! Execution records and history filters.

use crate::core::{ExecutionStatus, ScopeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single tool execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Unique per attempt.
    pub execution_id: Uuid,
    /// The owning scope.
    pub scope_id: ScopeId,
    /// The tool being executed.
    pub tool_name: String,
    /// When admission succeeded.
    pub started_at: DateTime<Utc>,
    /// When the record reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Whether the execution ran with memory context.
    pub context_enhanced: bool,
}

impl ExecutionRecord {
    /// Creates a running record.
    #[must_use]
    pub fn running(scope_id: ScopeId, tool_name: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            scope_id,
            tool_name: tool_name.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: ExecutionStatus::Running,
            context_enhanced: false,
        }
    }

    /// Returns the duration in milliseconds, if finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }

    /// Returns true if the record is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }
}

/// Filters for history queries. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only records for this tool.
    pub tool_name: Option<String>,
    /// Only records with this status.
    pub status: Option<ExecutionStatus>,
    /// Only records started at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one tool.
    #[must_use]
    pub fn tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to records started at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the record passes every set filter.
    #[must_use]
    pub fn matches(&self, record: &ExecutionRecord) -> bool {
        self.tool_name
            .as_deref()
            .map_or(true, |tool| record.tool_name == tool)
            && self.status.map_or(true, |status| record.status == status)
            && self.since.map_or(true, |since| record.started_at >= since)
    }
}

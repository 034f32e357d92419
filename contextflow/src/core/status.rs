//! Execution status and pipeline state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a tracked execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The execution is in flight.
    Running,
    /// The tool call completed.
    Succeeded,
    /// A fatal stage failed.
    Failed,
    /// The execution was cancelled at a stage boundary.
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Terminal status reported to callers.
///
/// `Rejected` has no execution record behind it: admission failed before one
/// was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The tool call completed, possibly without context enrichment.
    Succeeded,
    /// The tool call failed.
    Failed,
    /// Admission control rejected the call.
    Rejected,
    /// The call was cancelled.
    Cancelled,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// State machine driven by the orchestrator for a single request.
///
/// `Pending → Admitted → Running(i) → {Succeeded | Failed | Rejected | Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum PipelineState {
    /// Request received, not yet admitted.
    Pending,
    /// Admitted by the execution tracker.
    Admitted,
    /// Executing the stage at this index.
    Running(usize),
    /// Completed successfully.
    Succeeded,
    /// A fatal stage failed.
    Failed,
    /// Admission was refused.
    Rejected,
    /// Cancelled at a stage boundary.
    Cancelled,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Pending
    }
}

impl PipelineState {
    /// Returns true if no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Rejected | Self::Cancelled
        )
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Admitted | Self::Rejected) => true,
            (Self::Admitted, Self::Running(0) | Self::Cancelled) => true,
            (Self::Running(current), Self::Running(next_index)) => next_index == current + 1,
            (Self::Running(_), Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }

    /// Maps a terminal state to the status exposed to callers.
    #[must_use]
    pub fn response_status(&self) -> Option<ResponseStatus> {
        match self {
            Self::Succeeded => Some(ResponseStatus::Succeeded),
            Self::Failed => Some(ResponseStatus::Failed),
            Self::Rejected => Some(ResponseStatus::Rejected),
            Self::Cancelled => Some(ResponseStatus::Cancelled),
            _ => None,
        }
    }

    /// Maps a terminal state to the tracker status recorded for it.
    ///
    /// `Rejected` maps to `None` because no record exists.
    #[must_use]
    pub fn execution_status(&self) -> Option<ExecutionStatus> {
        match self {
            Self::Succeeded => Some(ExecutionStatus::Succeeded),
            Self::Failed => Some(ExecutionStatus::Failed),
            Self::Cancelled => Some(ExecutionStatus::Cancelled),
            Self::Admitted | Self::Running(_) => Some(ExecutionStatus::Running),
            Self::Pending | Self::Rejected => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Admitted => write!(f, "admitted"),
            Self::Running(stage) => write!(f, "running({stage})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

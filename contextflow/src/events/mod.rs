//! Execution events.
//!
//! The orchestrator reports lifecycle events through an injected
//! [`EventSink`]; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrator.
pub mod event_types {
    /// The tracker admitted the execution.
    pub const EXECUTION_ADMITTED: &str = "execution.admitted";
    /// The tracker refused the execution.
    pub const EXECUTION_REJECTED: &str = "execution.rejected";
    /// The execution reached a terminal status.
    pub const EXECUTION_COMPLETED: &str = "execution.completed";
    /// The execution was cancelled.
    pub const EXECUTION_CANCELLED: &str = "execution.cancelled";
    /// A stage started.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage finished and its effect was applied.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A degradable stage failed; the execution continues.
    pub const STAGE_DEGRADED: &str = "stage.degraded";
    /// A stage failed and the execution fails with it.
    pub const STAGE_FAILED: &str = "stage.failed";
}

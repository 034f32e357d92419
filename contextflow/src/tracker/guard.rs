//! Completion guard for admitted executions.

use super::ExecutionTracker;
use crate::core::ExecutionStatus;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Holds an admitted execution's slot until it is completed.
///
/// If the guard is dropped without [`ExecutionGuard::complete`] (the caller
/// dropped the future, or a stage panicked) the record is completed as
/// `Cancelled` so the scope gets its slot back.
pub struct ExecutionGuard {
    tracker: Arc<dyn ExecutionTracker>,
    execution_id: Uuid,
    completed: bool,
}

impl ExecutionGuard {
    /// Guards an execution that `tracker` has admitted.
    #[must_use]
    pub fn new(tracker: Arc<dyn ExecutionTracker>, execution_id: Uuid) -> Self {
        Self {
            tracker,
            execution_id,
            completed: false,
        }
    }

    /// The guarded execution.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Completes the execution and disarms the guard.
    pub fn complete(mut self, status: ExecutionStatus, context_enhanced: bool) -> bool {
        self.completed = true;
        self.tracker
            .complete(self.execution_id, status, context_enhanced)
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!(execution_id = %self.execution_id, "Execution abandoned before completion");
        self.tracker
            .complete(self.execution_id, ExecutionStatus::Cancelled, false);
    }
}

impl std::fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("execution_id", &self.execution_id)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScopeId;
    use crate::tracker::InMemoryExecutionTracker;

    #[test]
    fn test_dropped_guard_cancels() {
        let tracker: Arc<dyn ExecutionTracker> = Arc::new(InMemoryExecutionTracker::default());
        let scope = ScopeId::session("s");
        let id = tracker.begin(&scope, "t").unwrap();

        drop(ExecutionGuard::new(Arc::clone(&tracker), id));

        assert_eq!(tracker.running_count(&scope), 0);
        assert_eq!(tracker.get(id).unwrap().status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn test_completed_guard_keeps_status() {
        let tracker: Arc<dyn ExecutionTracker> = Arc::new(InMemoryExecutionTracker::default());
        let id = tracker.begin(&ScopeId::session("s"), "t").unwrap();

        let guard = ExecutionGuard::new(Arc::clone(&tracker), id);
        assert!(guard.complete(ExecutionStatus::Succeeded, true));

        let record = tracker.get(id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert!(record.context_enhanced);
    }
}

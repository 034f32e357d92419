//! Thread-safe execution tracker with per-scope admission control.

use super::{ExecutionRecord, HistoryFilter};
use crate::config::TrackerConfig;
use crate::core::{ExecutionStatus, ScopeId};
use crate::errors::AdmissionRejected;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Records in-flight and completed executions and enforces the per-scope
/// concurrency cap.
pub trait ExecutionTracker: Send + Sync {
    /// Admits a new execution or rejects it when the scope is at its cap.
    fn begin(&self, scope_id: &ScopeId, tool_name: &str) -> Result<Uuid, AdmissionRejected>;

    /// Moves a running record to a terminal status.
    ///
    /// Returns false (and logs an anomaly) when the record is unknown, already
    /// terminal, or `status` is not terminal. The first completion wins.
    fn complete(&self, execution_id: Uuid, status: ExecutionStatus, context_enhanced: bool) -> bool;

    /// Returns matching records for a scope, most recent first.
    fn history(&self, scope_id: &ScopeId, filter: &HistoryFilter) -> Vec<ExecutionRecord>;

    /// Returns a single record.
    fn get(&self, execution_id: Uuid) -> Option<ExecutionRecord>;

    /// Returns the number of running executions in a scope.
    fn running_count(&self, scope_id: &ScopeId) -> usize;
}

#[derive(Debug, Default)]
struct ScopeExecutions {
    running: usize,
    // Oldest first; history reads iterate in reverse.
    records: VecDeque<ExecutionRecord>,
}

/// In-memory execution tracker.
///
/// Admission and completion take the owning scope's lock only, so they are
/// linearizable per scope without serializing unrelated sessions.
#[derive(Debug)]
pub struct InMemoryExecutionTracker {
    config: TrackerConfig,
    scopes: DashMap<ScopeId, Arc<Mutex<ScopeExecutions>>>,
    index: DashMap<Uuid, ScopeId>,
}

impl Default for InMemoryExecutionTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl InMemoryExecutionTracker {
    /// Creates a new tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            scopes: DashMap::new(),
            index: DashMap::new(),
        }
    }

    /// Returns the per-scope running cap.
    #[must_use]
    pub fn max_running(&self) -> usize {
        self.config.max_running_per_scope
    }

    fn scope(&self, scope_id: &ScopeId) -> Option<Arc<Mutex<ScopeExecutions>>> {
        self.scopes.get(scope_id).map(|s| Arc::clone(&s))
    }

    /// Returns the number of scopes with running or retained records.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Prunes every scope and drops the ones left empty. Returns the number
    /// of scopes dropped.
    pub fn purge_expired(&self) -> usize {
        let scope_ids: Vec<ScopeId> = self.scopes.iter().map(|e| e.key().clone()).collect();
        scope_ids
            .iter()
            .filter(|scope_id| {
                if let Some(scope) = self.scope(scope_id) {
                    self.prune(&mut scope.lock());
                }
                self.reclaim(scope_id)
            })
            .count()
    }

    fn cutoff(&self) -> DateTime<Utc> {
        let max_age = chrono::Duration::from_std(self.config.history_max_age())
            .unwrap_or_else(|_| chrono::Duration::days(365));
        Utc::now() - max_age
    }

    /// Drops terminal records beyond the count window or older than the age
    /// window. Running records are never pruned.
    fn prune(&self, state: &mut ScopeExecutions) {
        let max_records = self.config.history_max_records.max(1);
        let cutoff = self.cutoff();

        let mut excess = state.records.len().saturating_sub(max_records);
        let index = &self.index;
        state.records.retain(|record| {
            if record.is_running() {
                return true;
            }
            if is_expired(record, cutoff) || excess > 0 {
                excess = excess.saturating_sub(1);
                index.remove(&record.execution_id);
                return false;
            }
            true
        });
    }

    /// Removes a scope with nothing running and nothing retained.
    ///
    /// Must not be called with the scope's lock held. `begin` locks the scope
    /// under the map entry, so a scope cannot be removed between lookup and
    /// admission.
    fn reclaim(&self, scope_id: &ScopeId) -> bool {
        let removed = self.scopes.remove_if(scope_id, |_, scope| {
            let state = scope.lock();
            state.running == 0 && state.records.is_empty()
        });
        if removed.is_some() {
            debug!(scope = %scope_id, "Reclaimed idle scope");
        }
        removed.is_some()
    }
}

fn is_expired(record: &ExecutionRecord, cutoff: DateTime<Utc>) -> bool {
    record.finished_at.map_or(false, |finished| finished < cutoff)
}

impl ExecutionTracker for InMemoryExecutionTracker {
    fn begin(&self, scope_id: &ScopeId, tool_name: &str) -> Result<Uuid, AdmissionRejected> {
        let entry = self.scopes.entry(scope_id.clone()).or_default();
        let scope = Arc::clone(&entry);
        let mut state = scope.lock();
        drop(entry);

        let limit = self.config.max_running_per_scope;
        if state.running >= limit {
            debug!(scope = %scope_id, tool = tool_name, running = state.running, limit, "Admission rejected");
            return Err(AdmissionRejected::new(scope_id.clone(), state.running, limit));
        }

        let record = ExecutionRecord::running(scope_id.clone(), tool_name);
        let execution_id = record.execution_id;
        state.running += 1;
        state.records.push_back(record);
        self.index.insert(execution_id, scope_id.clone());
        self.prune(&mut state);

        debug!(scope = %scope_id, tool = tool_name, %execution_id, running = state.running, "Execution admitted");
        Ok(execution_id)
    }

    fn complete(&self, execution_id: Uuid, status: ExecutionStatus, context_enhanced: bool) -> bool {
        if !status.is_terminal() {
            warn!(%execution_id, %status, "Ignoring completion with non-terminal status");
            return false;
        }

        let Some(scope_id) = self.index.get(&execution_id).map(|s| s.clone()) else {
            warn!(%execution_id, "Completion for unknown execution");
            return false;
        };
        let Some(scope) = self.scope(&scope_id) else {
            warn!(%execution_id, scope = %scope_id, "Completion for scope with no executions");
            return false;
        };
        let mut state = scope.lock();

        let Some(record) = state
            .records
            .iter_mut()
            .rev()
            .find(|r| r.execution_id == execution_id)
        else {
            warn!(%execution_id, "Completion for pruned execution");
            return false;
        };

        if record.status.is_terminal() {
            warn!(
                %execution_id,
                current = %record.status,
                requested = %status,
                "Duplicate completion ignored"
            );
            return false;
        }

        record.status = status;
        record.finished_at = Some(Utc::now());
        record.context_enhanced = context_enhanced;
        state.running = state.running.saturating_sub(1);
        self.prune(&mut state);
        drop(state);
        self.reclaim(&scope_id);

        debug!(%execution_id, scope = %scope_id, %status, context_enhanced, "Execution completed");
        true
    }

    fn history(&self, scope_id: &ScopeId, filter: &HistoryFilter) -> Vec<ExecutionRecord> {
        let Some(scope) = self.scope(scope_id) else {
            return Vec::new();
        };
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut state = scope.lock();
        self.prune(&mut state);

        let records: Vec<ExecutionRecord> = state
            .records
            .iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect();
        drop(state);
        self.reclaim(scope_id);
        records
    }

    fn get(&self, execution_id: Uuid) -> Option<ExecutionRecord> {
        let scope_id = self.index.get(&execution_id).map(|s| s.clone())?;
        let scope = self.scope(&scope_id)?;
        let cutoff = self.cutoff();
        let state = scope.lock();
        state
            .records
            .iter()
            .rev()
            .find(|r| r.execution_id == execution_id)
            .filter(|r| !is_expired(r, cutoff))
            .cloned()
    }

    fn running_count(&self, scope_id: &ScopeId) -> usize {
        self.scope(scope_id).map_or(0, |scope| scope.lock().running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker(max_running: usize, history: usize) -> InMemoryExecutionTracker {
        InMemoryExecutionTracker::new(TrackerConfig {
            max_running_per_scope: max_running,
            history_max_records: history,
            ..TrackerConfig::default()
        })
    }

    #[test]
    fn test_begin_and_complete() {
        let tracker = InMemoryExecutionTracker::default();
        let scope = ScopeId::session("s");

        let id = tracker.begin(&scope, "search_prompts").unwrap();
        assert_eq!(tracker.running_count(&scope), 1);

        assert!(tracker.complete(id, ExecutionStatus::Succeeded, true));
        assert_eq!(tracker.running_count(&scope), 0);

        let record = tracker.get(id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert!(record.context_enhanced);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_cap_rejects_fourth_begin() {
        let tracker = tracker(3, 100);
        let scope = ScopeId::session("s");
        for _ in 0..3 {
            tracker.begin(&scope, "search_prompts").unwrap();
        }

        let err = tracker.begin(&scope, "search_prompts").unwrap_err();
        assert_eq!(err.running, 3);
        assert_eq!(err.limit, 3);
        assert_eq!(tracker.history(&scope, &HistoryFilter::new()).len(), 3);
    }

    #[test]
    fn test_cap_is_per_scope() {
        let tracker = tracker(1, 100);
        tracker.begin(&ScopeId::session("a"), "t").unwrap();
        assert!(tracker.begin(&ScopeId::session("b"), "t").is_ok());
        assert!(tracker.begin(&ScopeId::session("a"), "t").is_err());
    }

    #[test]
    fn test_completion_frees_a_slot() {
        let tracker = tracker(1, 100);
        let scope = ScopeId::session("s");
        let id = tracker.begin(&scope, "t").unwrap();
        assert!(tracker.begin(&scope, "t").is_err());

        tracker.complete(id, ExecutionStatus::Failed, false);
        assert!(tracker.begin(&scope, "t").is_ok());
    }

    #[test]
    fn test_double_completion_keeps_first_status() {
        let tracker = InMemoryExecutionTracker::default();
        let scope = ScopeId::session("s");
        let id = tracker.begin(&scope, "t").unwrap();

        assert!(tracker.complete(id, ExecutionStatus::Cancelled, false));
        assert!(!tracker.complete(id, ExecutionStatus::Succeeded, true));

        let record = tracker.get(id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Cancelled);
        assert!(!record.context_enhanced);
        assert_eq!(tracker.running_count(&scope), 0);
    }

    #[test]
    fn test_non_terminal_completion_is_ignored() {
        let tracker = InMemoryExecutionTracker::default();
        let id = tracker.begin(&ScopeId::session("s"), "t").unwrap();

        assert!(!tracker.complete(id, ExecutionStatus::Running, false));
        assert!(tracker.get(id).unwrap().is_running());
    }

    #[test]
    fn test_unknown_completion_is_ignored() {
        let tracker = InMemoryExecutionTracker::default();
        assert!(!tracker.complete(Uuid::now_v7(), ExecutionStatus::Succeeded, false));
    }

    #[test]
    fn test_history_most_recent_first_and_filtered() {
        let tracker = tracker(10, 100);
        let scope = ScopeId::session("s");
        let first = tracker.begin(&scope, "search_prompts").unwrap();
        let second = tracker.begin(&scope, "store_prompt").unwrap();
        tracker.complete(first, ExecutionStatus::Succeeded, false);

        let all = tracker.history(&scope, &HistoryFilter::new());
        assert_eq!(all[0].execution_id, second);
        assert_eq!(all[1].execution_id, first);

        let searches = tracker.history(&scope, &HistoryFilter::new().tool("search_prompts"));
        assert_eq!(searches.len(), 1);

        let running = tracker.history(
            &scope,
            &HistoryFilter::new().status(ExecutionStatus::Running),
        );
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].execution_id, second);

        assert_eq!(tracker.history(&scope, &HistoryFilter::new().limit(1)).len(), 1);
    }

    #[test]
    fn test_history_count_window_prunes_terminal_only() {
        let tracker = tracker(10, 3);
        let scope = ScopeId::session("s");
        let long_running = tracker.begin(&scope, "slow").unwrap();

        for _ in 0..5 {
            let id = tracker.begin(&scope, "fast").unwrap();
            tracker.complete(id, ExecutionStatus::Succeeded, false);
        }

        let history = tracker.history(&scope, &HistoryFilter::new());
        assert_eq!(history.len(), 3);
        assert!(history.iter().any(|r| r.execution_id == long_running));
        assert!(tracker.get(long_running).is_some());
    }

    #[test]
    fn test_history_age_window_applies_on_read() {
        let tracker = InMemoryExecutionTracker::new(TrackerConfig {
            history_max_age_secs: 1,
            ..TrackerConfig::default()
        });
        let idle = ScopeId::session("idle");
        let busy = ScopeId::session("busy");
        let id = tracker.begin(&idle, "t").unwrap();
        tracker.complete(id, ExecutionStatus::Succeeded, false);
        let running = tracker.begin(&busy, "t").unwrap();
        assert_eq!(tracker.history(&idle, &HistoryFilter::new()).len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(1100));

        assert!(tracker.get(id).is_none());
        assert!(tracker.history(&idle, &HistoryFilter::new()).is_empty());
        assert_eq!(tracker.scope_count(), 1);
        assert_eq!(tracker.history(&busy, &HistoryFilter::new())[0].execution_id, running);
    }

    #[test]
    fn test_purge_expired_drops_idle_scopes() {
        let tracker = InMemoryExecutionTracker::new(TrackerConfig {
            history_max_age_secs: 1,
            ..TrackerConfig::default()
        });
        for name in ["a", "b", "c"] {
            let id = tracker.begin(&ScopeId::session(name), "t").unwrap();
            tracker.complete(id, ExecutionStatus::Succeeded, false);
        }
        tracker.begin(&ScopeId::session("d"), "t").unwrap();
        assert_eq!(tracker.scope_count(), 4);

        std::thread::sleep(std::time::Duration::from_millis(1100));

        assert_eq!(tracker.purge_expired(), 3);
        assert_eq!(tracker.scope_count(), 1);
        assert_eq!(tracker.running_count(&ScopeId::session("d")), 1);
    }

    #[test]
    fn test_concurrent_begin_respects_cap() {
        let tracker = Arc::new(tracker(3, 1000));
        let scope = ScopeId::session("hot");
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let scope = scope.clone();
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if tracker.begin(&scope, "t").is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.running_count(&scope), 3);
    }
}

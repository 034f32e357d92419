//! Bounded per-scope memory store.

use super::{MemoryEntry, MemoryKind};
use crate::config::MemoryConfig;
use crate::core::ScopeId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Append/evict store of recent interaction memory, partitioned by scope.
pub trait ContextMemoryStore: Send + Sync {
    /// Appends an entry, evicting the oldest entries once the scope exceeds
    /// its cap. Returns how many entries were evicted.
    fn record(&self, scope_id: &ScopeId, entry: MemoryEntry) -> usize;

    /// Returns up to `limit` of the most recent entries, newest first.
    ///
    /// `limit` is clamped to the per-scope cap; an unknown scope yields an
    /// empty snapshot.
    fn snapshot(
        &self,
        scope_id: &ScopeId,
        limit: usize,
        kind_filter: Option<&MemoryKind>,
    ) -> Vec<MemoryEntry>;

    /// Removes every entry for a scope. Idempotent.
    fn clear(&self, scope_id: &ScopeId);

    /// Returns the number of entries held for a scope.
    fn len(&self, scope_id: &ScopeId) -> usize;
}

type ScopeEntries = Arc<Mutex<VecDeque<MemoryEntry>>>;

/// In-memory store for memory entries.
///
/// Each scope owns its own lock, so writers on unrelated scopes never
/// contend with each other.
#[derive(Debug)]
pub struct InMemoryContextStore {
    scopes: DashMap<ScopeId, ScopeEntries>,
    max_entries: usize,
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl InMemoryContextStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            scopes: DashMap::new(),
            max_entries: config.max_entries_per_scope.max(1),
        }
    }

    /// Returns the per-scope cap.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns the number of scopes holding entries.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    fn scope(&self, scope_id: &ScopeId) -> Option<ScopeEntries> {
        self.scopes.get(scope_id).map(|entries| Arc::clone(&entries))
    }
}

impl ContextMemoryStore for InMemoryContextStore {
    fn record(&self, scope_id: &ScopeId, mut entry: MemoryEntry) -> usize {
        // Clone the Arc out so the shard lock is released before the scope lock is taken.
        let entries = Arc::clone(&self.scopes.entry(scope_id.clone()).or_default());
        let mut entries = entries.lock();

        entry.scope_id = scope_id.clone();
        if let Some(newest) = entries.back() {
            if entry.created_at < newest.created_at {
                entry.created_at = newest.created_at;
            }
        }
        entries.push_back(entry);

        let mut evicted = 0;
        while entries.len() > self.max_entries {
            entries.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            debug!(scope = %scope_id, evicted, "Evicted oldest memory entries");
        }
        evicted
    }

    fn snapshot(
        &self,
        scope_id: &ScopeId,
        limit: usize,
        kind_filter: Option<&MemoryKind>,
    ) -> Vec<MemoryEntry> {
        let Some(entries) = self.scope(scope_id) else {
            return Vec::new();
        };
        let limit = limit.min(self.max_entries);
        let entries = entries.lock();

        entries
            .iter()
            .rev()
            .filter(|e| kind_filter.map_or(true, |kind| &e.kind == kind))
            .take(limit)
            .cloned()
            .collect()
    }

    fn clear(&self, scope_id: &ScopeId) {
        if self.scopes.remove(scope_id).is_some() {
            debug!(scope = %scope_id, "Cleared scope memory");
        }
    }

    fn len(&self, scope_id: &ScopeId) -> usize {
        self.scope(scope_id).map_or(0, |entries| entries.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    fn store_with_cap(cap: usize) -> InMemoryContextStore {
        InMemoryContextStore::new(&MemoryConfig {
            max_entries_per_scope: cap,
            ..MemoryConfig::default()
        })
    }

    fn entry(scope: &ScopeId, kind: &str, n: i64) -> MemoryEntry {
        MemoryEntry::new(scope.clone(), kind, json!({ "n": n }))
    }

    #[test]
    fn test_snapshot_newest_first() {
        let store = store_with_cap(10);
        let scope = ScopeId::session("a");
        for n in 0..3 {
            store.record(&scope, entry(&scope, "search", n));
        }

        let snapshot = store.snapshot(&scope, 10, None);
        let ns: Vec<_> = snapshot.iter().map(|e| e.payload["n"].clone()).collect();
        assert_eq!(ns, vec![json!(2), json!(1), json!(0)]);
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        let store = store_with_cap(3);
        let scope = ScopeId::session("a");
        let mut evicted = 0;
        for n in 0..5 {
            evicted += store.record(&scope, entry(&scope, "search", n));
        }

        assert_eq!(evicted, 2);
        assert_eq!(store.len(&scope), 3);
        let oldest = store.snapshot(&scope, 3, None).last().cloned().unwrap();
        assert_eq!(oldest.payload["n"], json!(2));
    }

    #[test]
    fn test_limit_is_clamped() {
        let store = store_with_cap(2);
        let scope = ScopeId::user("u");
        for n in 0..2 {
            store.record(&scope, entry(&scope, "store", n));
        }

        assert_eq!(store.snapshot(&scope, usize::MAX, None).len(), 2);
        assert!(store.snapshot(&scope, 0, None).is_empty());
    }

    #[test]
    fn test_kind_filter() {
        let store = store_with_cap(10);
        let scope = ScopeId::session("a");
        store.record(&scope, entry(&scope, "search", 1));
        store.record(&scope, entry(&scope, "feedback", 2));
        store.record(&scope, entry(&scope, "search", 3));

        let searches = store.snapshot(&scope, 10, Some(&MemoryKind::Search));
        assert_eq!(searches.len(), 2);
        assert!(searches.iter().all(|e| e.kind == MemoryKind::Search));
    }

    #[test]
    fn test_unknown_scope_is_empty() {
        let store = InMemoryContextStore::default();
        assert!(store.snapshot(&ScopeId::session("nobody"), 5, None).is_empty());
        assert_eq!(store.len(&ScopeId::session("nobody")), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = InMemoryContextStore::default();
        let scope = ScopeId::session("a");
        store.record(&scope, entry(&scope, "search", 1));

        store.clear(&scope);
        store.clear(&scope);

        assert_eq!(store.len(&scope), 0);
        assert_eq!(store.scope_count(), 0);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let store = store_with_cap(10);
        let a = ScopeId::session("a");
        let b = ScopeId::session("b");
        store.record(&a, entry(&a, "search", 1));
        store.record(&b, entry(&b, "search", 2));

        let snapshot = store.snapshot(&a, 10, None);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].scope_id, a);
    }

    #[test]
    fn test_out_of_order_timestamps_are_clamped() {
        let store = store_with_cap(10);
        let scope = ScopeId::session("a");
        let now = Utc::now();
        store.record(&scope, entry(&scope, "search", 1).with_created_at(now));
        store.record(
            &scope,
            entry(&scope, "search", 2).with_created_at(now - ChronoDuration::seconds(30)),
        );

        let snapshot = store.snapshot(&scope, 10, None);
        assert!(snapshot[0].created_at >= snapshot[1].created_at);
        assert_eq!(snapshot[0].payload["n"], json!(2));
    }

    #[test]
    fn test_concurrent_writers_stay_bounded() {
        let store = Arc::new(store_with_cap(50));
        let scope = ScopeId::session("busy");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                let scope = scope.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        store.record(&scope, entry(&scope, "search", t * 1000 + n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(&scope), 50);
        let snapshot = store.snapshot(&scope, 50, None);
        assert!(snapshot.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}

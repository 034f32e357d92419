//! TTL + LRU result cache.

use super::Fingerprint;
use crate::config::CacheConfig;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Metadata an invalidation predicate is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeyMeta {
    /// The cache key.
    pub fingerprint: Fingerprint,
    /// The tool that produced the value.
    pub tool_name: String,
    /// Entity ids the cached value references.
    pub tags: BTreeSet<String>,
}

impl CacheKeyMeta {
    /// Creates metadata with no tags.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, tool_name: impl Into<String>) -> Self {
        Self {
            fingerprint,
            tool_name: tool_name.into(),
            tags: BTreeSet::new(),
        }
    }

    /// Adds entity tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Returns true if the value references `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Counters reported by [`ResultCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet swept.
    pub entries: usize,
    /// Reads that returned a live value.
    pub hits: u64,
    /// Reads that found nothing or an expired value.
    pub misses: u64,
    /// Entries dropped by the capacity bound.
    pub evictions: u64,
    /// Entries dropped by explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Returns hits / (hits + misses), or 0 before any read.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

/// Shared cache of tool results keyed by [`Fingerprint`].
///
/// A miss is a normal outcome and is reported as `None`.
pub trait ResultCache: Send + Sync {
    /// Returns the value if present and not expired.
    fn get(&self, fingerprint: &Fingerprint) -> Option<Value>;

    /// Stores or overwrites a value. Last writer wins.
    fn put(&self, meta: CacheKeyMeta, value: Value, ttl: Duration);

    /// Removes every entry whose metadata matches. Returns the count.
    fn invalidate(&self, predicate: &dyn Fn(&CacheKeyMeta) -> bool) -> usize;

    /// Removes every entry tagged with `tag`.
    fn invalidate_tag(&self, tag: &str) -> usize {
        self.invalidate(&|meta| meta.has_tag(tag))
    }

    /// Returns the current counters.
    fn stats(&self) -> CacheStats;

    /// Returns the number of entries held.
    fn len(&self) -> usize;

    /// Returns true if nothing is held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    meta: CacheKeyMeta,
    value: Value,
    stored_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<Fingerprint, CacheEntry>,
    stats: CacheStats,
}

/// In-process [`ResultCache`] backed by an LRU map.
#[derive(Debug)]
pub struct InMemoryResultCache {
    state: Mutex<CacheState>,
    default_ttl: Duration,
}

impl Default for InMemoryResultCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl InMemoryResultCache {
    /// Creates a cache. A `None` capacity disables LRU eviction.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let entries = match config.capacity {
            Some(capacity) => LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            None => LruCache::unbounded(),
        };
        Self {
            state: Mutex::new(CacheState {
                entries,
                stats: CacheStats::default(),
            }),
            default_ttl: config.default_ttl(),
        }
    }

    /// Returns the TTL used when a tool declares none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock();
        Self::sweep(&mut state.entries, Instant::now())
    }

    fn sweep(entries: &mut LruCache<Fingerprint, CacheEntry>, now: Instant) -> usize {
        let expired: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}

impl ResultCache for InMemoryResultCache {
    fn get(&self, fingerprint: &Fingerprint) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let live = match state.entries.get(fingerprint) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(entry) => {
                let age_ms = now.duration_since(entry.stored_at).as_millis();
                debug!(fingerprint = %fingerprint, age_ms, "Dropping expired cache entry on read");
                state.entries.pop(fingerprint);
                None
            }
            None => None,
        };

        if live.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        live
    }

    fn put(&self, meta: CacheKeyMeta, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            debug!(fingerprint = %meta.fingerprint, "Skipping cache write with zero ttl");
            return;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        let swept = Self::sweep(&mut state.entries, now);
        if swept > 0 {
            debug!(swept, "Swept expired cache entries");
        }

        let key = meta.fingerprint.clone();
        let entry = CacheEntry {
            meta,
            value,
            stored_at: now,
            expires_at: now + ttl,
        };
        if let Some((displaced, _)) = state.entries.push(key.clone(), entry) {
            if displaced != key {
                state.stats.evictions += 1;
                debug!(evicted = %displaced, "Evicted least recently used cache entry");
            }
        }
    }

    fn invalidate(&self, predicate: &dyn Fn(&CacheKeyMeta) -> bool) -> usize {
        let mut state = self.state.lock();
        let matched: Vec<Fingerprint> = state
            .entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.meta))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matched {
            state.entries.pop(key);
        }

        let removed = matched.len();
        state.stats.invalidations += removed as u64;
        if removed > 0 {
            debug!(removed, "Invalidated cache entries");
        }
        removed
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

//! Result cache for search-style tool outputs.
//!
//! Entries expire after a TTL, an optional capacity bound evicts the least
//! recently used entry, and tool handlers can drop entries that reference a
//! mutated entity through a [`CacheInvalidator`].

mod fingerprint;
mod invalidator;
mod store;

pub use fingerprint::{normalize_query, Fingerprint};
pub use invalidator::CacheInvalidator;
pub use store::{CacheKeyMeta, CacheStats, InMemoryResultCache, ResultCache};

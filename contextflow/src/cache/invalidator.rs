//! Invalidation hook handed to tool handlers.

use super::{CacheKeyMeta, ResultCache};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Lets a mutating tool drop cached results that reference what it changed.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn ResultCache>,
}

impl CacheInvalidator {
    /// Wraps a shared cache.
    #[must_use]
    pub fn new(cache: Arc<dyn ResultCache>) -> Self {
        Self { cache }
    }

    /// Removes every entry whose metadata matches.
    pub fn invalidate(&self, predicate: impl Fn(&CacheKeyMeta) -> bool) -> usize {
        self.cache.invalidate(&predicate)
    }

    /// Removes every entry tagged with `tag`.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let removed = self.cache.invalidate_tag(tag);
        debug!(tag, removed, "Cache invalidated by tag");
        removed
    }

    /// Removes every entry produced by `tool_name`.
    pub fn invalidate_tool(&self, tool_name: &str) -> usize {
        self.cache.invalidate(&|meta| meta.tool_name == tool_name)
    }
}

impl fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("entries", &self.cache.len())
            .finish()
    }
}

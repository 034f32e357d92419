//! Per-scope interaction memory.
//!
//! The store is partitioned by scope and knows nothing about pipelines.

mod entry;
mod store;

pub use entry::{MemoryEntry, MemoryKind};
pub use store::{ContextMemoryStore, InMemoryContextStore};

//! Execution tracking and per-scope admission control.

mod guard;
mod record;
mod in_memory;

pub use guard::ExecutionGuard;
pub use record::{ExecutionRecord, HistoryFilter};
pub use in_memory::{ExecutionTracker, InMemoryExecutionTracker};

//! Cooperative cancellation for executions.

mod token;

pub use token::{CancelCallback, CancellationToken};

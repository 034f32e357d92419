//! Logging setup, stage timing and event payloads.

mod payloads;
mod subscriber;
mod timer;

pub use payloads::{execution_payload, stage_payload};
pub use subscriber::{init_tracing, LogFormat};
pub use timer::SpanTimer;

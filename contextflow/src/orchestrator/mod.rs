//! The context orchestrator: admission, the stage loop and completion.
//!
//! A request moves through
//! `Pending → Admitted → Running(i) → {Succeeded | Failed | Rejected | Cancelled}`.
//! Every admitted execution is completed in the tracker exactly once, on
//! every path.

mod builder;
mod engine;


pub use builder::OrchestratorBuilder;
pub use engine::ContextOrchestrator;

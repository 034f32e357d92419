//! Core domain model types for contextflow.
//!
//! This module contains the fundamental types shared by every component:
//! - Scope identifiers and immutable tool requests
//! - Execution and pipeline state enums
//! - The response shape returned to callers

mod request;
mod response;
mod status;

pub use request::{ContextRequest, ScopeId, QUERY_KEY};
pub use response::ToolResponse;
pub use status::{ExecutionStatus, PipelineState, ResponseStatus};

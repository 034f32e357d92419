//! # Contextflow
//!
//! Context orchestration for tool execution.
//!
//! Contextflow turns a raw tool invocation into a context-aware execution:
//!
//! - **Pipelines**: a configurable, ordered list of stages per tool
//!   (`retrieveMemory → buildContext → invokeTool → cacheWrite → recordMemory`)
//! - **Scope memory**: a bounded, FIFO-evicting memory store per session or user
//! - **Admission control**: a per-scope cap on concurrently running executions
//! - **Result caching**: TTL and LRU bounded, with tag-based invalidation for
//!   write paths
//! - **Graceful degradation**: non-critical stages fail softly and the response
//!   says whether the tool ran with memory context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contextflow::prelude::*;
//!
//! let orchestrator = ContextOrchestrator::builder()
//!     .with_tool(ToolDescriptor::search("search_prompts"), Arc::new(SearchHandler))
//!     .with_pipelines(PipelineConfigSet::from_path("pipelines.json")?)
//!     .build()?;
//!
//! let response = orchestrator
//!     .execute(ContextRequest::new(ScopeId::session("s-1"), "search_prompts")
//!         .with_parameter("query", json!("rust async")))
//!     .await;
//! assert!(response.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod memory;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod testing;
pub mod tools;
pub mod tracker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{
        CacheInvalidator, CacheKeyMeta, CacheStats, Fingerprint, InMemoryResultCache, ResultCache,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::OrchestratorConfig;
    pub use crate::context::{EnrichedContext, ParamType, ParameterSchema, UnifiedContextBuilder};
    pub use crate::core::{
        ContextRequest, ExecutionStatus, PipelineState, ResponseStatus, ScopeId, ToolResponse,
    };
    pub use crate::errors::{AdmissionRejected, ConfigError, ContextflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::memory::{ContextMemoryStore, InMemoryContextStore, MemoryEntry, MemoryKind};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{ContextOrchestrator, OrchestratorBuilder};
    pub use crate::pipeline::{
        PipelineConfig, PipelineConfigSet, PipelineStage, StageContext, StageEffect, StageId,
    };
    pub use crate::tools::{ToolCall, ToolDescriptor, ToolHandler, ToolKind, ToolRegistry};
    pub use crate::tracker::{
        ExecutionRecord, ExecutionTracker, HistoryFilter, InMemoryExecutionTracker,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use serde_json::json;

    #[test]
    fn prelude_covers_a_round_trip() {
        let orchestrator = ContextOrchestrator::builder().build().unwrap();
        let request =
            ContextRequest::new(ScopeId::user("u"), "nothing").with_parameter("query", json!("x"));
        let response = tokio_test::block_on(orchestrator.execute(request));
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(orchestrator.tracker().running_count(&ScopeId::user("u")), 0);
    }
}

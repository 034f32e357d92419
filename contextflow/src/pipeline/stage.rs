//! Stage trait, per-execution stage context and stage registry.

use super::StageId;
use crate::context::EnrichedContext;
use crate::core::ContextRequest;
use crate::errors::ContextflowError;
use crate::memory::MemoryEntry;
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// The effect a stage produced.
///
/// Stages never mutate shared execution state directly. The orchestrator
/// applies the returned effect, so the result of a stage that timed out or
/// was cancelled is never observed.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEffect {
    /// A memory snapshot, newest first.
    Memory(Vec<MemoryEntry>),
    /// Enriched parameters for the tool.
    Enriched(EnrichedContext),
    /// A cached result found ahead of the tool call.
    CacheHit(Value),
    /// The tool's result.
    ToolResult {
        /// The JSON result.
        value: Value,
        /// True if served from the result cache.
        from_cache: bool,
    },
    /// A side effect was performed.
    Applied,
    /// Nothing to do for this request.
    Skipped(String),
}

impl StageEffect {
    /// Creates a skipped effect.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// Returns true unless the stage skipped.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }

    /// Returns a short label for events and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Enriched(_) => "enriched",
            Self::CacheHit(_) => "cache_hit",
            Self::ToolResult { .. } => "tool_result",
            Self::Applied => "applied",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// Execution state visible to stages.
#[derive(Debug, Clone)]
pub struct StageContext {
    request: Arc<ContextRequest>,
    execution_id: Uuid,
    descriptor: Option<Arc<ToolDescriptor>>,
    deadline: Instant,
    memory: Option<Vec<MemoryEntry>>,
    enriched: Option<EnrichedContext>,
    cached: Option<Value>,
    tool_result: Option<Value>,
    from_cache: bool,
}

impl StageContext {
    /// Creates the context for one execution.
    #[must_use]
    pub fn new(
        request: Arc<ContextRequest>,
        execution_id: Uuid,
        descriptor: Option<Arc<ToolDescriptor>>,
    ) -> Self {
        Self {
            request,
            execution_id,
            descriptor,
            deadline: Instant::now(),
            memory: None,
            enriched: None,
            cached: None,
            tool_result: None,
            from_cache: false,
        }
    }

    /// Sets the deadline of the stage about to run.
    pub fn start_stage(&mut self, timeout: Duration) {
        self.deadline = Instant::now() + timeout;
    }

    /// Applies a stage effect.
    pub fn apply(&mut self, effect: StageEffect) {
        match effect {
            StageEffect::Memory(entries) => self.memory = Some(entries),
            StageEffect::Enriched(enriched) => self.enriched = Some(enriched),
            StageEffect::CacheHit(value) => self.cached = Some(value),
            StageEffect::ToolResult { value, from_cache } => {
                self.tool_result = Some(value);
                self.from_cache = from_cache;
            }
            StageEffect::Applied | StageEffect::Skipped(_) => {}
        }
    }

    /// The request being executed.
    #[must_use]
    pub fn request(&self) -> &ContextRequest {
        &self.request
    }

    /// The tracked execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// The registered tool's descriptor, if any.
    #[must_use]
    pub fn descriptor(&self) -> Option<&ToolDescriptor> {
        self.descriptor.as_deref()
    }

    /// When the current stage times out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The memory snapshot, if retrieved.
    #[must_use]
    pub fn memory(&self) -> Option<&[MemoryEntry]> {
        self.memory.as_deref()
    }

    /// The enriched context, if built.
    #[must_use]
    pub fn enriched(&self) -> Option<&EnrichedContext> {
        self.enriched.as_ref()
    }

    /// A cached result found by lookup.
    #[must_use]
    pub fn cached(&self) -> Option<&Value> {
        self.cached.as_ref()
    }

    /// The tool result, once invoked.
    #[must_use]
    pub fn tool_result(&self) -> Option<&Value> {
        self.tool_result.as_ref()
    }

    /// True if the tool result came from the cache.
    #[must_use]
    pub fn result_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Parameters the tool receives: enriched when available, otherwise the
    /// caller's own.
    #[must_use]
    pub fn tool_parameters(&self) -> Map<String, Value> {
        self.enriched.as_ref().map_or_else(
            || self.request.parameters().clone(),
            |enriched| enriched.parameters.clone(),
        )
    }

    /// Consumes the context and returns the tool result.
    #[must_use]
    pub fn into_tool_result(self) -> Option<Value> {
        self.tool_result
    }
}

/// One unit of work in a pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync + Debug {
    /// The id this stage is registered under.
    fn id(&self) -> &StageId;

    /// Runs the stage against the current context.
    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError>;
}

/// Maps stage ids to implementations.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    stages: HashMap<StageId, Arc<dyn PipelineStage>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage under its own id, replacing any previous one.
    pub fn register(&mut self, stage: Arc<dyn PipelineStage>) -> Option<Arc<dyn PipelineStage>> {
        self.stages.insert(stage.id().clone(), stage)
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.register(stage);
        self
    }

    /// Returns a stage.
    #[must_use]
    pub fn get(&self, id: &StageId) -> Option<Arc<dyn PipelineStage>> {
        self.stages.get(id).cloned()
    }

    /// Returns true if a stage is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &StageId) -> bool {
        self.stages.contains_key(id)
    }

    /// Returns registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<StageId> {
        let mut ids: Vec<_> = self.stages.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

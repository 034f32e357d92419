//! Built-in stages.

use super::{PipelineStage, StageContext, StageEffect, StageId, StageRegistry};
use crate::cache::{CacheKeyMeta, Fingerprint, ResultCache};
use crate::context::{UnifiedContextBuilder, CONTEXT_KEY};
use crate::errors::ContextflowError;
use crate::memory::{ContextMemoryStore, MemoryEntry, MemoryKind};
use crate::tools::{CacheInvalidator, ToolCall, ToolDescriptor, ToolRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared services the built-in stages run against.
#[derive(Clone)]
pub struct StageServices {
    /// Scope memory.
    pub memory: Arc<dyn ContextMemoryStore>,
    /// Result cache.
    pub cache: Arc<dyn ResultCache>,
    /// Tool handlers.
    pub tools: Arc<ToolRegistry>,
    /// Entries fetched by `retrieveMemory`.
    pub snapshot_limit: usize,
    /// TTL used when a tool declares none.
    pub default_cache_ttl: Duration,
}

impl std::fmt::Debug for StageServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageServices")
            .field("tools", &self.tools)
            .field("snapshot_limit", &self.snapshot_limit)
            .field("default_cache_ttl", &self.default_cache_ttl)
            .finish_non_exhaustive()
    }
}

impl StageRegistry {
    /// Creates a registry holding every built-in stage.
    #[must_use]
    pub fn with_builtins(services: &StageServices) -> Self {
        Self::new()
            .with_stage(Arc::new(RetrieveMemoryStage::new(services)))
            .with_stage(Arc::new(BuildContextStage::new(UnifiedContextBuilder::new())))
            .with_stage(Arc::new(CacheLookupStage::new(services)))
            .with_stage(Arc::new(InvokeToolStage::new(services)))
            .with_stage(Arc::new(CacheWriteStage::new(services)))
            .with_stage(Arc::new(RecordMemoryStage::new(services)))
    }
}

fn fingerprint_for(ctx: &StageContext, descriptor: &ToolDescriptor) -> Fingerprint {
    let request = ctx.request();
    Fingerprint::compute(
        request.tool_name(),
        request.query(),
        request.parameters(),
        &descriptor.relevant_keys,
    )
}

/// Reads the scope's recent memory.
#[derive(Clone)]
pub struct RetrieveMemoryStage {
    id: StageId,
    memory: Arc<dyn ContextMemoryStore>,
    limit: usize,
}

impl RetrieveMemoryStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &StageServices) -> Self {
        Self {
            id: StageId::from(StageId::RETRIEVE_MEMORY),
            memory: Arc::clone(&services.memory),
            limit: services.snapshot_limit,
        }
    }
}

impl std::fmt::Debug for RetrieveMemoryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieveMemoryStage")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for RetrieveMemoryStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        let snapshot = self.memory.snapshot(ctx.request().scope_id(), self.limit, None);
        Ok(StageEffect::Memory(snapshot))
    }
}

/// Merges memory into the tool parameters and validates them.
#[derive(Debug, Clone)]
pub struct BuildContextStage {
    id: StageId,
    builder: UnifiedContextBuilder,
}

impl BuildContextStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(builder: UnifiedContextBuilder) -> Self {
        Self {
            id: StageId::from(StageId::BUILD_CONTEXT),
            builder,
        }
    }
}

#[async_trait]
impl PipelineStage for BuildContextStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        let snapshot = ctx.memory().unwrap_or_default();
        let schema = ctx.descriptor().and_then(|d| d.schema.as_ref());
        let enriched = self
            .builder
            .build_validated(ctx.request(), snapshot, schema)
            .map_err(|err| ContextflowError::stage_failed(StageId::BUILD_CONTEXT, err.to_string()))?;
        Ok(StageEffect::Enriched(enriched))
    }
}

/// Serves a cached result ahead of the tool call.
#[derive(Clone)]
pub struct CacheLookupStage {
    id: StageId,
    cache: Arc<dyn ResultCache>,
}

impl CacheLookupStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &StageServices) -> Self {
        Self {
            id: StageId::from(StageId::CACHE_LOOKUP),
            cache: Arc::clone(&services.cache),
        }
    }
}

impl std::fmt::Debug for CacheLookupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLookupStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for CacheLookupStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        let Some(descriptor) = ctx.descriptor().filter(|d| d.cacheable) else {
            return Ok(StageEffect::skipped("tool is not cacheable"));
        };
        let fingerprint = fingerprint_for(ctx, descriptor);
        match self.cache.get(&fingerprint) {
            Some(value) => {
                debug!(tool = %descriptor.name, %fingerprint, "Result cache hit");
                Ok(StageEffect::CacheHit(value))
            }
            None => Ok(StageEffect::skipped("cache miss")),
        }
    }
}

/// Calls the tool handler. Never skippable.
#[derive(Clone)]
pub struct InvokeToolStage {
    id: StageId,
    tools: Arc<ToolRegistry>,
    invalidator: CacheInvalidator,
}

impl InvokeToolStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &StageServices) -> Self {
        Self {
            id: StageId::from(StageId::INVOKE_TOOL),
            tools: Arc::clone(&services.tools),
            invalidator: CacheInvalidator::new(Arc::clone(&services.cache)),
        }
    }
}

impl std::fmt::Debug for InvokeToolStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeToolStage")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for InvokeToolStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        if let Some(cached) = ctx.cached() {
            return Ok(StageEffect::ToolResult {
                value: cached.clone(),
                from_cache: true,
            });
        }

        let request = ctx.request();
        let tool = self.tools.get(request.tool_name())?;
        let call = ToolCall {
            tool_name: request.tool_name().to_string(),
            scope_id: request.scope_id().clone(),
            execution_id: ctx.execution_id(),
            parameters: ctx.tool_parameters(),
            deadline: ctx.deadline(),
            invalidator: self.invalidator.clone(),
        };

        let value = tool
            .handler
            .invoke(call)
            .await
            .map_err(|err| ContextflowError::tool_failed(request.tool_name(), format!("{err:#}")))?;
        Ok(StageEffect::ToolResult {
            value,
            from_cache: false,
        })
    }
}

/// Stores a fresh result of a cacheable tool.
#[derive(Clone)]
pub struct CacheWriteStage {
    id: StageId,
    cache: Arc<dyn ResultCache>,
    default_ttl: Duration,
}

impl CacheWriteStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &StageServices) -> Self {
        Self {
            id: StageId::from(StageId::CACHE_WRITE),
            cache: Arc::clone(&services.cache),
            default_ttl: services.default_cache_ttl,
        }
    }
}

impl std::fmt::Debug for CacheWriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriteStage")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for CacheWriteStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        let Some(descriptor) = ctx.descriptor().filter(|d| d.cacheable) else {
            return Ok(StageEffect::skipped("tool is not cacheable"));
        };
        let Some(result) = ctx.tool_result() else {
            return Ok(StageEffect::skipped("no tool result"));
        };
        if ctx.result_from_cache() {
            return Ok(StageEffect::skipped("result served from cache"));
        }

        let fingerprint = fingerprint_for(ctx, descriptor);
        let meta = CacheKeyMeta::new(fingerprint, &descriptor.name).with_tags(descriptor.tags_for(result));
        let ttl = descriptor.cache_ttl.unwrap_or(self.default_ttl);
        self.cache.put(meta, result.clone(), ttl);
        Ok(StageEffect::Applied)
    }
}

/// Appends a compact outcome to the scope's memory.
#[derive(Clone)]
pub struct RecordMemoryStage {
    id: StageId,
    memory: Arc<dyn ContextMemoryStore>,
}

impl RecordMemoryStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &StageServices) -> Self {
        Self {
            id: StageId::from(StageId::RECORD_MEMORY),
            memory: Arc::clone(&services.memory),
        }
    }
}

impl std::fmt::Debug for RecordMemoryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordMemoryStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for RecordMemoryStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        let Some(result) = ctx.tool_result() else {
            return Ok(StageEffect::skipped("no tool result"));
        };
        let request = ctx.request();
        let kind = ctx
            .descriptor()
            .map_or_else(|| MemoryKind::Custom("tool".to_string()), |d| d.kind.memory_kind());

        let entry = MemoryEntry::new(request.scope_id().clone(), kind, outcome_summary(ctx, result));
        self.memory.record(request.scope_id(), entry);
        Ok(StageEffect::Applied)
    }
}

fn outcome_summary(ctx: &StageContext, result: &Value) -> Value {
    let request = ctx.request();
    let mut parameters = request.parameters().clone();
    parameters.remove(CONTEXT_KEY);

    let result_count = match result {
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    };
    let entities: Vec<String> = ctx
        .descriptor()
        .map(|d| d.tags_for(result).into_iter().collect())
        .unwrap_or_default();

    json!({
        "tool": request.tool_name(),
        "query": request.query(),
        "parameters": parameters,
        "resultCount": result_count,
        "entities": entities,
        "fromCache": ctx.result_from_cache(),
    })
}

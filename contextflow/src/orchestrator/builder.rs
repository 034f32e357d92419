//! Builder for [`ContextOrchestrator`].

use super::ContextOrchestrator;
use crate::cache::{InMemoryResultCache, ResultCache};
use crate::config::OrchestratorConfig;
use crate::errors::ConfigError;
use crate::events::{EventSink, NoOpEventSink};
use crate::memory::{ContextMemoryStore, InMemoryContextStore};
use crate::pipeline::{ConfigHandle, PipelineConfigSet, PipelineStage, StageRegistry, StageServices};
use crate::tools::{ToolDescriptor, ToolHandler, ToolRegistry};
use crate::tracker::{ExecutionTracker, InMemoryExecutionTracker};
use std::sync::Arc;
use tracing::debug;

/// Wires collaborators into a [`ContextOrchestrator`].
///
/// Anything not supplied is created in memory from the configuration.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    memory: Option<Arc<dyn ContextMemoryStore>>,
    tracker: Option<Arc<dyn ExecutionTracker>>,
    cache: Option<Arc<dyn ResultCache>>,
    tools: Arc<ToolRegistry>,
    stages: Vec<Arc<dyn PipelineStage>>,
    events: Option<Arc<dyn EventSink>>,
    pipelines: Option<PipelineConfigSet>,
}

impl OrchestratorBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration used for defaults and caps.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Injects a memory store.
    #[must_use]
    pub fn with_memory_store(mut self, memory: Arc<dyn ContextMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Injects an execution tracker.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Injects a result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Injects a tool registry, replacing any tools added so far.
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Registers one tool.
    #[must_use]
    pub fn with_tool(self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.register(descriptor, handler);
        self
    }

    /// Registers a stage, replacing the built-in stage with the same id.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Injects an event sink. Events are discarded by default.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the pipeline configuration installed at build time.
    #[must_use]
    pub fn with_pipelines(mut self, pipelines: PipelineConfigSet) -> Self {
        self.pipelines = Some(pipelines);
        self
    }

    /// Validates the configuration, resolves every pipeline and builds.
    pub fn build(self) -> Result<ContextOrchestrator, ConfigError> {
        let config = self.config;
        config.validate()?;

        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryContextStore::new(&config.memory)));
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(InMemoryExecutionTracker::new(config.tracker.clone())));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryResultCache::new(&config.cache)));

        let services = StageServices {
            memory: Arc::clone(&memory),
            cache: Arc::clone(&cache),
            tools: Arc::clone(&self.tools),
            snapshot_limit: config.memory.default_snapshot_limit,
            default_cache_ttl: config.cache.default_ttl(),
        };
        let mut registry = StageRegistry::with_builtins(&services);
        for stage in self.stages {
            if registry.register(Arc::clone(&stage)).is_some() {
                debug!(stage = %stage.id(), "Replaced built-in stage");
            }
        }

        let pipelines = ConfigHandle::new(registry, config.pipeline.default_stage_timeout())?;
        if let Some(set) = &self.pipelines {
            pipelines.swap(set)?;
        }

        Ok(ContextOrchestrator {
            memory,
            tracker,
            cache,
            tools: self.tools,
            pipelines,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
        })
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .field("stages", &self.stages)
            .field("pipelines", &self.pipelines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, StageId};
    use crate::testing::SlowStage;
    use std::time::Duration;

    #[test]
    fn test_build_with_defaults() {
        let orchestrator = OrchestratorBuilder::new().build().unwrap();
        assert_eq!(orchestrator.config_version(), 0);
        assert!(orchestrator.tools().is_empty());
        assert!(orchestrator.pipeline_for("anything").is_default);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = OrchestratorConfig::default();
        config.tracker.max_running_per_scope = 0;
        let err = OrchestratorBuilder::new().with_config(config).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_pipelines_are_installed_at_build() {
        let orchestrator = OrchestratorBuilder::new()
            .with_pipelines(PipelineConfigSet::new(vec![PipelineConfig::new(
                "search_prompts",
                [StageId::RETRIEVE_MEMORY, StageId::BUILD_CONTEXT, StageId::INVOKE_TOOL],
            )]))
            .build()
            .unwrap();

        assert_eq!(orchestrator.config_version(), 1);
        assert_eq!(orchestrator.pipeline_for("search_prompts").stages.len(), 3);
    }

    #[test]
    fn test_stage_override_is_resolved() {
        let orchestrator = OrchestratorBuilder::new()
            .with_stage(Arc::new(SlowStage::new(
                StageId::BUILD_CONTEXT,
                Duration::from_millis(1),
            )))
            .with_pipelines(PipelineConfigSet::new(vec![PipelineConfig::new(
                "t",
                [StageId::BUILD_CONTEXT, StageId::INVOKE_TOOL],
            )]))
            .build()
            .unwrap();

        let pipeline = orchestrator.pipeline_for("t");
        assert!(format!("{:?}", pipeline.stages[0].stage).contains("SlowStage"));
    }
}

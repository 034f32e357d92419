//! Versioned, hot-swappable pipeline configuration.

use super::{PipelineConfig, PipelineConfigSet, PipelineStage, StageId, StageRegistry};
use crate::errors::ConfigError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A stage resolved against the registry.
#[derive(Debug, Clone)]
pub struct ResolvedStage {
    /// The configured id.
    pub id: StageId,
    /// The implementation.
    pub stage: Arc<dyn PipelineStage>,
    /// Whether a failure degrades instead of failing the execution.
    pub degradable: bool,
}

/// A pipeline ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    /// The tool it serves.
    pub tool_name: String,
    /// Stages in order.
    pub stages: Vec<ResolvedStage>,
    /// Per-stage timeout.
    pub stage_timeout: Duration,
    /// True for the fallback used when a tool has no configured pipeline.
    pub is_default: bool,
}

impl ResolvedPipeline {
    fn resolve(
        config: &PipelineConfig,
        registry: &StageRegistry,
        default_timeout: Duration,
        is_default: bool,
    ) -> Result<Self, ConfigError> {
        let stages = config
            .stages
            .iter()
            .map(|id| {
                let stage = registry.get(id).ok_or_else(|| ConfigError::UnknownStage {
                    tool: config.tool_name.clone(),
                    stage: id.to_string(),
                })?;
                Ok(ResolvedStage {
                    id: id.clone(),
                    stage,
                    degradable: config.is_degradable(id),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            tool_name: config.tool_name.clone(),
            stages,
            stage_timeout: config.stage_timeout(default_timeout),
            is_default,
        })
    }

    /// Returns the number of enrichment stages configured.
    #[must_use]
    pub fn enrichment_stage_count(&self) -> usize {
        self.stages.iter().filter(|s| s.id.is_enrichment()).count()
    }

    /// Returns the configured stage ids.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<&StageId> {
        self.stages.iter().map(|s| &s.id).collect()
    }
}

/// Name the fallback pipeline is resolved under before it is bound to a tool.
const DEFAULT_PIPELINE: &str = "<default>";

#[derive(Debug)]
struct CatalogVersion {
    version: u64,
    pipelines: HashMap<String, Arc<ResolvedPipeline>>,
}

/// Holds the installed configuration set.
///
/// Installing a set resolves every stage up front and then replaces the whole
/// set in one step. Executions that already resolved their pipeline keep it;
/// only later calls see the new version.
#[derive(Debug)]
pub struct ConfigHandle {
    registry: StageRegistry,
    default_timeout: Duration,
    fallback: ResolvedPipeline,
    current: RwLock<Arc<CatalogVersion>>,
}

impl ConfigHandle {
    /// Creates a handle with no pipelines installed (version 0).
    ///
    /// Fails when the registry cannot serve the `[invokeTool]` fallback.
    pub fn new(registry: StageRegistry, default_timeout: Duration) -> Result<Self, ConfigError> {
        let fallback = ResolvedPipeline::resolve(
            &PipelineConfig::new(DEFAULT_PIPELINE, [StageId::INVOKE_TOOL]),
            &registry,
            default_timeout,
            true,
        )?;
        Ok(Self {
            registry,
            default_timeout,
            fallback,
            current: RwLock::new(Arc::new(CatalogVersion {
                version: 0,
                pipelines: HashMap::new(),
            })),
        })
    }

    /// Validates, resolves and atomically installs `set`. Returns the new
    /// version. On error the installed set is unchanged.
    pub fn swap(&self, set: &PipelineConfigSet) -> Result<u64, ConfigError> {
        set.validate()?;
        let pipelines = set
            .pipelines
            .iter()
            .map(|config| {
                ResolvedPipeline::resolve(config, &self.registry, self.default_timeout, false)
                    .map(|resolved| (config.tool_name.clone(), Arc::new(resolved)))
            })
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        let mut current = self.current.write();
        let version = current.version + 1;
        let tools = pipelines.len();
        *current = Arc::new(CatalogVersion { version, pipelines });
        drop(current);

        info!(version, tools, "Installed pipeline configuration");
        Ok(version)
    }

    /// Returns the pipeline for a tool, or the single-stage fallback when
    /// none is configured.
    #[must_use]
    pub fn resolve(&self, tool_name: &str) -> Arc<ResolvedPipeline> {
        let current = Arc::clone(&self.current.read());
        if let Some(pipeline) = current.pipelines.get(tool_name) {
            return Arc::clone(pipeline);
        }

        debug!(
            tool = tool_name,
            version = current.version,
            "ConfigurationMissing: running default pipeline"
        );
        Arc::new(ResolvedPipeline {
            tool_name: tool_name.to_string(),
            ..self.fallback.clone()
        })
    }

    /// Returns the installed version; 0 before the first install.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Returns the configured tools, sorted.
    #[must_use]
    pub fn tools(&self) -> Vec<String> {
        let mut tools: Vec<_> = self.current.read().pipelines.keys().cloned().collect();
        tools.sort();
        tools
    }

    /// Returns the stage registry pipelines resolve against.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{StageContext, StageEffect};
    use crate::errors::ContextflowError;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Noop(StageId);

    #[async_trait]
    impl PipelineStage for Noop {
        fn id(&self) -> &StageId {
            &self.0
        }

        async fn run(&self, _ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
            Ok(StageEffect::Applied)
        }
    }

    fn registry() -> StageRegistry {
        [
            StageId::RETRIEVE_MEMORY,
            StageId::BUILD_CONTEXT,
            StageId::INVOKE_TOOL,
            StageId::RECORD_MEMORY,
        ]
        .into_iter()
        .fold(StageRegistry::new(), |registry, id| {
            registry.with_stage(Arc::new(Noop(StageId::from(id))))
        })
    }

    fn handle() -> ConfigHandle {
        ConfigHandle::new(registry(), Duration::from_secs(5)).unwrap()
    }

    fn enriched(tool: &str) -> PipelineConfig {
        PipelineConfig::new(
            tool,
            [StageId::RETRIEVE_MEMORY, StageId::BUILD_CONTEXT, StageId::INVOKE_TOOL],
        )
        .continue_on_failure(StageId::BUILD_CONTEXT)
    }

    #[test]
    fn test_unknown_tool_gets_default_pipeline() {
        let handle = handle();
        let pipeline = handle.resolve("anything");
        assert!(pipeline.is_default);
        assert_eq!(pipeline.stage_ids(), vec![&StageId::from(StageId::INVOKE_TOOL)]);
        assert_eq!(pipeline.enrichment_stage_count(), 0);
    }

    #[test]
    fn test_registry_without_invoke_tool_is_rejected() {
        let registry = StageRegistry::new()
            .with_stage(Arc::new(Noop(StageId::from(StageId::RETRIEVE_MEMORY))));

        let err = ConfigHandle::new(registry, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { ref stage, .. } if stage == "invokeTool"));
    }

    #[test]
    fn test_swap_installs_new_version() {
        let handle = handle();
        assert_eq!(handle.version(), 0);

        let version = handle
            .swap(&PipelineConfigSet::new(vec![enriched("search_prompts")]))
            .unwrap();
        assert_eq!(version, 1);

        let pipeline = handle.resolve("search_prompts");
        assert!(!pipeline.is_default);
        assert_eq!(pipeline.enrichment_stage_count(), 2);
        assert!(pipeline.stages[1].degradable);
        assert!(!pipeline.stages[2].degradable);
    }

    #[test]
    fn test_resolved_pipeline_survives_swap() {
        let handle = handle();
        handle
            .swap(&PipelineConfigSet::new(vec![enriched("search_prompts")]))
            .unwrap();
        let before = handle.resolve("search_prompts");

        handle.swap(&PipelineConfigSet::default()).unwrap();
        assert_eq!(handle.version(), 2);
        assert_eq!(before.stages.len(), 3);
        assert!(handle.resolve("search_prompts").is_default);
    }

    #[test]
    fn test_unknown_stage_leaves_config_untouched() {
        let handle = handle();
        handle
            .swap(&PipelineConfigSet::new(vec![enriched("a")]))
            .unwrap();

        let bad = PipelineConfigSet::new(vec![PipelineConfig::new(
            "b",
            [StageId::INVOKE_TOOL, StageId::CACHE_WRITE],
        )]);
        let err = handle.swap(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { ref stage, .. } if stage == "cacheWrite"));
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.tools(), vec!["a".to_string()]);
    }

    #[test]
    fn test_stage_timeout_resolution() {
        let handle = handle();
        handle
            .swap(&PipelineConfigSet::new(vec![
                enriched("fast").with_stage_timeout(Duration::from_millis(20)),
                enriched("slow"),
            ]))
            .unwrap();

        assert_eq!(handle.resolve("fast").stage_timeout, Duration::from_millis(20));
        assert_eq!(handle.resolve("slow").stage_timeout, Duration::from_secs(5));
    }
}

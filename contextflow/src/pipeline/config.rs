//! Pipeline configuration documents.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Identifier of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Memory snapshot for the request scope.
    pub const RETRIEVE_MEMORY: &'static str = "retrieveMemory";
    /// Merge of snapshot and request parameters.
    pub const BUILD_CONTEXT: &'static str = "buildContext";
    /// Result cache read ahead of the tool.
    pub const CACHE_LOOKUP: &'static str = "cacheLookup";
    /// The tool handler call.
    pub const INVOKE_TOOL: &'static str = "invokeTool";
    /// Result cache write.
    pub const CACHE_WRITE: &'static str = "cacheWrite";
    /// Memory append of the outcome.
    pub const RECORD_MEMORY: &'static str = "recordMemory";

    /// Creates a stage id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the tool invocation stage.
    #[must_use]
    pub fn is_invoke_tool(&self) -> bool {
        self.0 == Self::INVOKE_TOOL
    }

    /// Returns true for stages that contribute to context enrichment.
    #[must_use]
    pub fn is_enrichment(&self) -> bool {
        self.0 == Self::RETRIEVE_MEMORY || self.0 == Self::BUILD_CONTEXT
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<&str> for StageId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Ordered stages run for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// The tool this pipeline serves.
    pub tool_name: String,
    /// Stages in execution order.
    pub stages: Vec<StageId>,
    /// Per-stage timeout; the configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_stage_timeout_ms: Option<u64>,
    /// Stages whose failure degrades the response instead of failing it.
    #[serde(default)]
    pub continue_on_stage_failure: HashSet<StageId>,
}

impl PipelineConfig {
    /// Creates a pipeline.
    #[must_use]
    pub fn new<I, S>(tool_name: impl Into<String>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        Self {
            tool_name: tool_name.into(),
            stages: stages.into_iter().map(Into::into).collect(),
            per_stage_timeout_ms: None,
            continue_on_stage_failure: HashSet::new(),
        }
    }

    /// Creates the single-stage pipeline used for unconfigured tools.
    #[must_use]
    pub fn passthrough(tool_name: impl Into<String>) -> Self {
        Self::new(tool_name, [StageId::INVOKE_TOOL])
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.per_stage_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Lets a stage fail softly.
    #[must_use]
    pub fn continue_on_failure(mut self, stage: impl Into<StageId>) -> Self {
        self.continue_on_stage_failure.insert(stage.into());
        self
    }

    /// Returns the stage timeout, falling back to `default`.
    #[must_use]
    pub fn stage_timeout(&self, default: Duration) -> Duration {
        self.per_stage_timeout_ms.map_or(default, Duration::from_millis)
    }

    /// Returns true if a failure in `stage` degrades instead of failing.
    #[must_use]
    pub fn is_degradable(&self, stage: &StageId) -> bool {
        !stage.is_invoke_tool() && self.continue_on_stage_failure.contains(stage)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.as_str() == id)
    }

    /// Checks structure and ordering of the built-in stages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tool = self.tool_name.as_str();
        if tool.trim().is_empty() {
            return Err(ConfigError::invalid_pipeline(tool, "tool name cannot be empty"));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage) {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    format!("stage '{stage}' appears more than once"),
                ));
            }
        }

        let Some(invoke) = self.position(StageId::INVOKE_TOOL) else {
            return Err(ConfigError::invalid_pipeline(
                tool,
                "pipeline must contain the invokeTool stage",
            ));
        };

        for before in [StageId::RETRIEVE_MEMORY, StageId::BUILD_CONTEXT, StageId::CACHE_LOOKUP] {
            if self.position(before).is_some_and(|at| at > invoke) {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    format!("'{before}' must run before invokeTool"),
                ));
            }
        }
        for after in [StageId::CACHE_WRITE, StageId::RECORD_MEMORY] {
            if self.position(after).is_some_and(|at| at < invoke) {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    format!("'{after}' must run after invokeTool"),
                ));
            }
        }
        if let (Some(retrieve), Some(build)) = (
            self.position(StageId::RETRIEVE_MEMORY),
            self.position(StageId::BUILD_CONTEXT),
        ) {
            if retrieve > build {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    "'retrieveMemory' must run before 'buildContext'",
                ));
            }
        }

        for stage in &self.continue_on_stage_failure {
            if stage.is_invoke_tool() {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    "invokeTool cannot be listed in continueOnStageFailure",
                ));
            }
            if !self.stages.contains(stage) {
                return Err(ConfigError::invalid_pipeline(
                    tool,
                    format!("continueOnStageFailure lists '{stage}' which is not in the pipeline"),
                ));
            }
        }

        if self.per_stage_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_pipeline(
                tool,
                "perStageTimeoutMs must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// The whole set of pipelines, installed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigSet {
    /// One pipeline per tool.
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl PipelineConfigSet {
    /// Creates a set from pipelines.
    #[must_use]
    pub fn new(pipelines: Vec<PipelineConfig>) -> Self {
        Self { pipelines }
    }

    /// Adds a pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Parses a `{ "pipelines": [...] }` document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let set: Self = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validates every pipeline and rejects duplicate tools.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut tools = HashSet::new();
        for pipeline in &self.pipelines {
            pipeline.validate()?;
            if !tools.insert(pipeline.tool_name.as_str()) {
                return Err(ConfigError::invalid_pipeline(
                    &pipeline.tool_name,
                    "more than one pipeline configured for this tool",
                ));
            }
        }
        Ok(())
    }

    /// Returns the pipeline for a tool.
    #[must_use]
    pub fn get(&self, tool_name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.tool_name == tool_name)
    }
}

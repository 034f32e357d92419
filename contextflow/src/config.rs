//! Configuration for the orchestration core.
//!
//! Every field has a default so a partial JSON document (or none at all) is
//! a valid configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Context memory store settings.
    pub memory: MemoryConfig,
    /// Execution tracker settings.
    pub tracker: TrackerConfig,
    /// Result cache settings.
    pub cache: CacheConfig,
    /// Pipeline defaults.
    pub pipeline: PipelineDefaults,
}

impl OrchestratorConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks that every cap is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.max_entries_per_scope == 0 {
            return Err(ConfigError::invalid_value(
                "memory.max_entries_per_scope",
                "must be greater than zero",
            ));
        }
        if self.tracker.max_running_per_scope == 0 {
            return Err(ConfigError::invalid_value(
                "tracker.max_running_per_scope",
                "must be greater than zero",
            ));
        }
        if self.tracker.history_max_records == 0 {
            return Err(ConfigError::invalid_value(
                "tracker.history_max_records",
                "must be greater than zero",
            ));
        }
        if self.cache.capacity == Some(0) {
            return Err(ConfigError::invalid_value(
                "cache.capacity",
                "use null for an unbounded cache instead of zero",
            ));
        }
        if self.pipeline.default_stage_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "pipeline.default_stage_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Context memory store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Entries kept per scope before FIFO eviction.
    pub max_entries_per_scope: usize,
    /// Entries returned by the `retrieveMemory` stage.
    pub default_snapshot_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries_per_scope: 200,
            default_snapshot_limit: 20,
        }
    }
}

/// Execution tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum simultaneous running executions per scope.
    pub max_running_per_scope: usize,
    /// Records retained per scope.
    pub history_max_records: usize,
    /// Age after which terminal records are pruned.
    pub history_max_age_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_running_per_scope: 3,
            history_max_records: 100,
            history_max_age_secs: 3600,
        }
    }
}

impl TrackerConfig {
    /// Returns the history age limit.
    #[must_use]
    pub fn history_max_age(&self) -> Duration {
        Duration::from_secs(self.history_max_age_secs)
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// LRU capacity; `None` disables the capacity bound.
    pub capacity: Option<usize>,
    /// TTL used when a tool does not declare its own.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Some(1024),
            default_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    /// Returns the default TTL.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Defaults applied to pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    /// Stage timeout for the fallback pipeline and pipelines that omit one.
    pub default_stage_timeout_ms: u64,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            default_stage_timeout_ms: 5000,
        }
    }
}

impl PipelineDefaults {
    /// Returns the default stage timeout.
    #[must_use]
    pub fn default_stage_timeout(&self) -> Duration {
        Duration::from_millis(self.default_stage_timeout_ms)
    }
}

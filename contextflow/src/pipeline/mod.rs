//! Pipeline configuration, stages and the stage registry.
//!
//! A pipeline is an ordered list of [`StageId`]s configured per tool. Stage
//! ids are resolved against a [`StageRegistry`] once, when a configuration
//! set is installed into the [`ConfigHandle`].

mod builtin;
mod catalog;
mod config;
mod stage;

pub use builtin::{
    BuildContextStage, CacheLookupStage, CacheWriteStage, InvokeToolStage, RecordMemoryStage,
    RetrieveMemoryStage, StageServices,
};
pub use catalog::{ConfigHandle, ResolvedPipeline, ResolvedStage};
pub use config::{PipelineConfig, PipelineConfigSet, StageId};
pub use stage::{PipelineStage, StageContext, StageEffect, StageRegistry};

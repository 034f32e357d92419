//! Mock pipeline stages, registered over a built-in id to alter its behavior.

use crate::errors::ContextflowError;
use crate::pipeline::{PipelineStage, StageContext, StageEffect, StageId};
use async_trait::async_trait;
use std::time::Duration;

/// Sleeps before producing an effect.
#[derive(Debug, Clone)]
pub struct SlowStage {
    id: StageId,
    delay: Duration,
    effect: StageEffect,
}

impl SlowStage {
    /// Creates a slow stage that reports [`StageEffect::Applied`].
    #[must_use]
    pub fn new(id: impl Into<StageId>, delay: Duration) -> Self {
        Self {
            id: id.into(),
            delay,
            effect: StageEffect::Applied,
        }
    }

    /// Sets the effect produced after the delay.
    #[must_use]
    pub fn with_effect(mut self, effect: StageEffect) -> Self {
        self.effect = effect;
        self
    }
}

#[async_trait]
impl PipelineStage for SlowStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, _ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.effect.clone())
    }
}

/// Always fails.
#[derive(Debug, Clone)]
pub struct FailingStage {
    id: StageId,
    message: String,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(id: impl Into<StageId>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PipelineStage for FailingStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn run(&self, _ctx: &StageContext) -> Result<StageEffect, ContextflowError> {
        Err(ContextflowError::stage_failed(self.id.as_str(), &self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContextRequest, ScopeId};
    use std::sync::Arc;
    use uuid::Uuid;

    fn context() -> StageContext {
        StageContext::new(
            Arc::new(ContextRequest::new(ScopeId::session("s"), "t")),
            Uuid::now_v7(),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_waits() {
        let stage = SlowStage::new(StageId::BUILD_CONTEXT, Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        let effect = stage.run(&context()).await.unwrap();
        assert_eq!(effect, StageEffect::Applied);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new(StageId::RECORD_MEMORY, "disk full");
        let err = stage.run(&context()).await.unwrap_err();
        assert_eq!(err.to_string(), "Stage 'recordMemory' failed: disk full");
    }
}

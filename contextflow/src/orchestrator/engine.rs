//! Drives one request through its resolved pipeline.

use super::OrchestratorBuilder;
use crate::cache::{CacheInvalidator, ResultCache};
use crate::cancellation::CancellationToken;
use crate::core::{ContextRequest, ExecutionStatus, PipelineState, ToolResponse};
use crate::errors::{ConfigError, ContextflowError};
use crate::events::{event_types, EventSink};
use crate::memory::ContextMemoryStore;
use crate::observability::{execution_payload, stage_payload, SpanTimer};
use crate::pipeline::{ConfigHandle, PipelineConfigSet, ResolvedPipeline, StageContext};
use crate::tools::ToolRegistry;
use crate::tracker::{ExecutionGuard, ExecutionTracker};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Runs tool requests through configured stage pipelines.
///
/// All collaborators are injected through [`OrchestratorBuilder`]; nothing is
/// process-global, so several orchestrators can coexist in one process.
pub struct ContextOrchestrator {
    pub(super) memory: Arc<dyn ContextMemoryStore>,
    pub(super) tracker: Arc<dyn ExecutionTracker>,
    pub(super) cache: Arc<dyn ResultCache>,
    pub(super) tools: Arc<ToolRegistry>,
    pub(super) pipelines: ConfigHandle,
    pub(super) events: Arc<dyn EventSink>,
}

enum Outcome {
    Succeeded,
    Failed(ContextflowError),
    Cancelled(String),
}

struct ExecutionRun {
    ctx: StageContext,
    state: PipelineState,
    degraded: Vec<String>,
    enrichment_applied: usize,
}

impl ContextOrchestrator {
    /// Starts building an orchestrator.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Executes a request that cannot be cancelled externally.
    pub async fn execute(&self, request: ContextRequest) -> ToolResponse {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Executes a request, observing `token` at every stage boundary.
    ///
    /// Cancellation does not interrupt a running stage. The stage finishes (or
    /// times out), its result is discarded and the execution ends `Cancelled`.
    /// Dropping the returned future also ends the execution `Cancelled`.
    pub async fn execute_with_cancel(
        &self,
        request: ContextRequest,
        token: &CancellationToken,
    ) -> ToolResponse {
        let pipeline = self.pipelines.resolve(request.tool_name());
        let mut state = PipelineState::Pending;

        let execution_id = match self.tracker.begin(request.scope_id(), request.tool_name()) {
            Ok(execution_id) => execution_id,
            Err(rejection) => {
                advance(&mut state, PipelineState::Rejected);
                warn!(
                    scope = %request.scope_id(),
                    tool = request.tool_name(),
                    running = rejection.running,
                    limit = rejection.limit,
                    "Admission rejected"
                );
                self.events.try_emit(
                    event_types::EXECUTION_REJECTED,
                    Some(execution_payload(
                        None,
                        request.scope_id().as_str(),
                        request.tool_name(),
                        json!({ "running": rejection.running, "limit": rejection.limit }),
                    )),
                );
                return ToolResponse::rejected(&rejection);
            }
        };
        advance(&mut state, PipelineState::Admitted);
        let guard = ExecutionGuard::new(Arc::clone(&self.tracker), execution_id);

        let span = info_span!(
            "execution",
            %execution_id,
            scope = %request.scope_id(),
            tool = request.tool_name()
        );
        self.run_admitted(&pipeline, request, guard, state, token)
            .instrument(span)
            .await
    }

    /// Executes independent requests concurrently. Responses keep the input
    /// order.
    pub async fn execute_batch(&self, requests: Vec<ContextRequest>) -> Vec<ToolResponse> {
        join_all(requests.into_iter().map(|request| self.execute(request))).await
    }

    /// Installs a new pipeline configuration set as one atomic version swap.
    ///
    /// Executions already running keep the pipeline they resolved.
    pub fn reload_config(&self, set: &PipelineConfigSet) -> Result<u64, ConfigError> {
        self.pipelines.swap(set)
    }

    /// Returns the installed configuration version.
    #[must_use]
    pub fn config_version(&self) -> u64 {
        self.pipelines.version()
    }

    /// Returns the pipeline a request for `tool_name` would run.
    #[must_use]
    pub fn pipeline_for(&self, tool_name: &str) -> Arc<ResolvedPipeline> {
        self.pipelines.resolve(tool_name)
    }

    /// The context memory store.
    #[must_use]
    pub fn memory(&self) -> &Arc<dyn ContextMemoryStore> {
        &self.memory
    }

    /// The execution tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<dyn ExecutionTracker> {
        &self.tracker
    }

    /// The result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }

    /// The tool registry.
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Returns an invalidation hook for write paths outside tool handlers.
    #[must_use]
    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator::new(Arc::clone(&self.cache))
    }

    async fn run_admitted(
        &self,
        pipeline: &ResolvedPipeline,
        request: ContextRequest,
        guard: ExecutionGuard,
        state: PipelineState,
        token: &CancellationToken,
    ) -> ToolResponse {
        let execution_id = guard.execution_id();
        self.events.try_emit(
            event_types::EXECUTION_ADMITTED,
            Some(execution_payload(
                Some(execution_id),
                request.scope_id().as_str(),
                request.tool_name(),
                json!({
                    "stages": pipeline.stage_ids(),
                    "default_pipeline": pipeline.is_default,
                }),
            )),
        );
        debug!(
            stages = pipeline.stages.len(),
            default_pipeline = pipeline.is_default,
            "Execution admitted"
        );

        let timer = SpanTimer::start(request.tool_name());
        let descriptor = self.tools.descriptor(request.tool_name());
        let mut run = ExecutionRun {
            ctx: StageContext::new(Arc::new(request), execution_id, descriptor),
            state,
            degraded: Vec::new(),
            enrichment_applied: 0,
        };

        let outcome = self.run_stages(pipeline, &mut run, token).await;
        self.finish(pipeline, run, outcome, timer, guard)
    }

    async fn run_stages(
        &self,
        pipeline: &ResolvedPipeline,
        run: &mut ExecutionRun,
        token: &CancellationToken,
    ) -> Outcome {
        let execution_id = run.ctx.execution_id();
        let tool = pipeline.tool_name.as_str();

        for (index, resolved) in pipeline.stages.iter().enumerate() {
            if let Some(reason) = cancellation(token) {
                return Outcome::Cancelled(reason);
            }

            let stage = resolved.id.as_str();
            advance(&mut run.state, PipelineState::Running(index));
            run.ctx.start_stage(pipeline.stage_timeout);
            self.events.try_emit(
                event_types::STAGE_STARTED,
                Some(stage_payload(execution_id, tool, stage, index, None, None, None)),
            );

            let timer = SpanTimer::start(stage);
            let result = tokio::time::timeout(pipeline.stage_timeout, resolved.stage.run(&run.ctx))
                .await
                .unwrap_or_else(|_| {
                    Err(ContextflowError::StageTimeout {
                        stage: stage.to_string(),
                        timeout_ms: as_millis(pipeline.stage_timeout),
                    })
                });
            let duration_ms = timer.finish();

            if let Some(reason) = cancellation(token) {
                debug!(stage, "Discarding stage result after cancellation");
                return Outcome::Cancelled(reason);
            }

            match result {
                Ok(effect) => {
                    debug!(stage, outcome = effect.label(), duration_ms, "Stage completed");
                    self.events.try_emit(
                        event_types::STAGE_COMPLETED,
                        Some(stage_payload(
                            execution_id,
                            tool,
                            stage,
                            index,
                            Some(duration_ms),
                            Some(effect.label()),
                            None,
                        )),
                    );
                    if resolved.id.is_enrichment() && effect.is_applied() {
                        run.enrichment_applied += 1;
                    }
                    run.ctx.apply(effect);
                }
                Err(err) if resolved.degradable => {
                    warn!(stage, error = %err, duration_ms, "Stage degraded; continuing without its effect");
                    self.events.try_emit(
                        event_types::STAGE_DEGRADED,
                        Some(stage_payload(
                            execution_id,
                            tool,
                            stage,
                            index,
                            Some(duration_ms),
                            None,
                            Some(&err.to_string()),
                        )),
                    );
                    run.degraded.push(stage.to_string());
                }
                Err(err) => {
                    warn!(stage, error = %err, duration_ms, "Stage failed");
                    self.events.try_emit(
                        event_types::STAGE_FAILED,
                        Some(stage_payload(
                            execution_id,
                            tool,
                            stage,
                            index,
                            Some(duration_ms),
                            None,
                            Some(&err.to_string()),
                        )),
                    );
                    return Outcome::Failed(err);
                }
            }
        }

        Outcome::Succeeded
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(
        &self,
        pipeline: &ResolvedPipeline,
        run: ExecutionRun,
        outcome: Outcome,
        timer: SpanTimer,
        guard: ExecutionGuard,
    ) -> ToolResponse {
        let ExecutionRun {
            ctx,
            mut state,
            degraded,
            enrichment_applied,
        } = run;

        let configured = pipeline.enrichment_stage_count();
        let quality = if configured == 0 {
            0.0
        } else {
            enrichment_applied as f64 / configured as f64
        };
        let enhanced = configured > 0
            && enrichment_applied == configured
            && degraded.is_empty()
            && ctx.enriched().is_some();

        let execution_id = ctx.execution_id();
        let scope = ctx.request().scope_id().clone();
        let tool = pipeline.tool_name.clone();

        let (response, status) = match outcome {
            Outcome::Succeeded => {
                advance(&mut state, PipelineState::Succeeded);
                let result = ctx.into_tool_result().unwrap_or(Value::Null);
                (
                    ToolResponse::succeeded(execution_id, result).with_enrichment(enhanced, quality),
                    ExecutionStatus::Succeeded,
                )
            }
            Outcome::Failed(err) => {
                advance(&mut state, PipelineState::Failed);
                (
                    ToolResponse::failed(execution_id, &err).with_enrichment(false, quality),
                    ExecutionStatus::Failed,
                )
            }
            Outcome::Cancelled(reason) => {
                advance(&mut state, PipelineState::Cancelled);
                (
                    ToolResponse::cancelled(execution_id, reason).with_enrichment(false, quality),
                    ExecutionStatus::Cancelled,
                )
            }
        };
        let response = response.with_degraded_stages(degraded);

        guard.complete(status, response.context_enhanced);

        let duration_ms = timer.finish();
        let (event_type, extra) = if status == ExecutionStatus::Cancelled {
            (
                event_types::EXECUTION_CANCELLED,
                json!({ "reason": response.error, "duration_ms": duration_ms }),
            )
        } else {
            (
                event_types::EXECUTION_COMPLETED,
                json!({
                    "status": status,
                    "context_enhanced": response.context_enhanced,
                    "context_quality": response.context_quality,
                    "degraded_stages": response.degraded_stages,
                    "duration_ms": duration_ms,
                }),
            )
        };
        self.events.try_emit(
            event_type,
            Some(execution_payload(Some(execution_id), scope.as_str(), &tool, extra)),
        );

        info!(
            %status,
            context_enhanced = response.context_enhanced,
            context_quality = response.context_quality,
            duration_ms,
            "Execution finished"
        );
        response
    }
}

impl std::fmt::Debug for ContextOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextOrchestrator")
            .field("tools", &self.tools)
            .field("pipelines", &self.pipelines)
            .finish_non_exhaustive()
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    if !state.can_transition_to(next) {
        warn!(from = %state, to = %next, "Unexpected pipeline state transition");
    }
    *state = next;
}

fn cancellation(token: &CancellationToken) -> Option<String> {
    token
        .is_cancelled()
        .then(|| token.reason().unwrap_or_else(|| "cancelled".to_string()))
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

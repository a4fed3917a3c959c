use crate::planner::{self, ExecutionPlan, ExecutionStep};
use crate::registry::ExecutorRegistry;
use crate::resolver::{CompletedOutputs, InputResolver};
use canvascore::{
    CanvasGraph, CanvasId, EventPayload, EventSink, Record, Run, RunError, RunEvent, RunId,
    RunStatus, StepId, StepRecord,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Final snapshot of a run and the steps it dispatched
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: Run,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn run_id(&self) -> RunId {
        self.run.id
    }

    pub fn succeeded(&self) -> bool {
        self.run.status == RunStatus::Completed
    }
}

/// Walks an execution plan one step at a time.
///
/// Holds no state between runs: every call plans afresh, allocates a new run
/// id and keeps its outputs local to that call, so concurrent runs on the
/// same orchestrator never share anything except the sinks they are given.
pub struct RunOrchestrator {
    registry: Arc<ExecutorRegistry>,
    resolver: Arc<InputResolver>,
}

impl RunOrchestrator {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self::with_resolver(registry, Arc::new(InputResolver::default()))
    }

    pub fn with_resolver(registry: Arc<ExecutorRegistry>, resolver: Arc<InputResolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Compile and execute a canvas.
    ///
    /// Failures are not returned as errors: they end the run in the failed
    /// state and are reported through `step:failed` / `run:failed` events.
    pub async fn execute(
        &self,
        canvas_id: impl Into<CanvasId>,
        graph: &CanvasGraph,
        input: Record,
        sink: &dyn EventSink,
    ) -> RunReport {
        let run_id = RunId::new_v4();
        let run_start = Instant::now();
        let mut run = Run::new(run_id, canvas_id, input, Utc::now());
        run.status = RunStatus::Running;

        let plan = match planner::plan_graph(graph) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Run {} could not be planned: {}", run_id, e);
                self.emit_started(&run, 0, sink).await;
                return self
                    .fail_run(run, Vec::new(), RunError::from(e), run_start, sink)
                    .await;
            }
        };

        tracing::info!(
            "Starting run {} on canvas {} ({} steps)",
            run_id,
            run.canvas_id,
            plan.len()
        );
        self.emit_started(&run, plan.len(), sink).await;

        self.execute_plan(run, &plan, run_start, sink).await
    }

    async fn emit_started(&self, run: &Run, total_steps: usize, sink: &dyn EventSink) {
        let payload = EventPayload::RunStarted {
            canvas_id: run.canvas_id.clone(),
            input: run.input.clone(),
            total_steps,
        };
        sink.emit(&RunEvent::new(run.id, payload)).await;
    }

    async fn execute_plan(
        &self,
        mut run: Run,
        plan: &ExecutionPlan,
        run_start: Instant,
        sink: &dyn EventSink,
    ) -> RunReport {
        let mut outputs = CompletedOutputs::new();
        let mut steps = Vec::with_capacity(plan.len());

        for (index, step) in plan.steps.iter().enumerate() {
            let input = self.resolver.resolve(step.node_type, &outputs, &run.input);
            match self.execute_step(run.id, index, step, input, sink).await {
                Ok(record) => {
                    if let Some(output) = &record.output {
                        outputs.insert(step.node_id.clone(), step.node_type, output.clone());
                    }
                    steps.push(record);
                }
                Err((record, error)) => {
                    steps.push(record);
                    return self.fail_run(run, steps, error, run_start, sink).await;
                }
            }
        }

        let output = outputs.final_output().cloned().unwrap_or_default();
        let total_latency_ms = run_start.elapsed().as_millis() as u64;
        run.complete(output.clone(), Utc::now());

        tracing::info!("Run {} completed in {}ms", run.id, total_latency_ms);
        sink.emit(&RunEvent::new(
            run.id,
            EventPayload::RunCompleted {
                output,
                total_latency_ms,
            },
        ))
        .await;

        RunReport { run, steps }
    }

    async fn execute_step(
        &self,
        run_id: RunId,
        index: usize,
        step: &ExecutionStep,
        input: Record,
        sink: &dyn EventSink,
    ) -> Result<StepRecord, (StepRecord, RunError)> {
        let mut record = StepRecord::started(
            StepId::new_v4(),
            run_id,
            step.node_id.clone(),
            step.node_type,
            step.label.clone(),
            input.clone(),
            Utc::now(),
        );
        let start = Instant::now();

        tracing::debug!("Run {} step {}: {} ({})", run_id, index, step.node_id, step.node_type);
        sink.emit(&RunEvent::new(
            run_id,
            EventPayload::StepStarted {
                step_id: record.id,
                node_id: step.node_id.clone(),
                node_type: step.node_type,
                label: step.label.clone(),
                index,
                input: input.clone(),
            },
        ))
        .await;

        let result = match self.registry.get(step.node_type) {
            Some(executor) => executor
                .execute(input, &step.config)
                .await
                .map_err(|source| RunError::StepFailed {
                    node_id: step.node_id.clone(),
                    source,
                }),
            None => Err(RunError::UnknownStepType {
                node_id: step.node_id.clone(),
                node_type: step.node_type,
            }),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                record.complete(output.clone(), latency_ms, Utc::now());
                tracing::debug!("Step {} completed in {}ms", step.node_id, latency_ms);
                sink.emit(&RunEvent::new(
                    run_id,
                    EventPayload::StepCompleted {
                        step_id: record.id,
                        node_id: step.node_id.clone(),
                        node_type: step.node_type,
                        label: step.label.clone(),
                        index,
                        output,
                        latency_ms,
                    },
                ))
                .await;
                Ok(record)
            }
            Err(error) => {
                let message = match &error {
                    RunError::StepFailed { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                record.fail(message.clone(), latency_ms, Utc::now());
                tracing::error!("Step {} failed: {}", step.node_id, message);
                sink.emit(&RunEvent::new(
                    run_id,
                    EventPayload::StepFailed {
                        step_id: record.id,
                        node_id: step.node_id.clone(),
                        node_type: step.node_type,
                        label: step.label.clone(),
                        index,
                        error: message,
                        latency_ms,
                    },
                ))
                .await;
                Err((record, error))
            }
        }
    }

    async fn fail_run(
        &self,
        mut run: Run,
        steps: Vec<StepRecord>,
        error: RunError,
        run_start: Instant,
        sink: &dyn EventSink,
    ) -> RunReport {
        let message = error.to_string();
        run.fail(message.clone(), Utc::now());
        tracing::error!(
            "Run {} failed after {}ms: {}",
            run.id,
            run_start.elapsed().as_millis(),
            message
        );
        sink.emit(&RunEvent::new(run.id, EventPayload::RunFailed { error: message }))
            .await;

        RunReport { run, steps }
    }
}

use async_trait::async_trait;
use canvascore::{EventPayload, EventSink, Record, Run, RunEvent, RunId, RunStatus, StepRecord};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub const DEFAULT_TRACER_CAPACITY: usize = 100;

struct TracedRun {
    run: Run,
    steps: Vec<StepRecord>,
}

#[derive(Default)]
struct TracerState {
    runs: HashMap<RunId, TracedRun>,
    /// Run ids in admission order, oldest first
    admitted: VecDeque<RunId>,
}

/// Bounded, queryable history of recent runs rebuilt from the event stream.
///
/// Purely an observer: dropping it changes nothing about how runs execute.
pub struct EventTracer {
    capacity: usize,
    state: RwLock<TracerState>,
}

impl EventTracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(TracerState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Apply one event to the cache
    pub async fn record(&self, event: &RunEvent) {
        let mut state = self.state.write().await;

        if let EventPayload::RunStarted {
            canvas_id, input, ..
        } = &event.payload
        {
            self.admit(&mut state, event, canvas_id, input);
            return;
        }

        let Some(traced) = state.runs.get_mut(&event.run_id) else {
            tracing::debug!("Ignoring {} for untracked run {}", event.kind(), event.run_id);
            return;
        };

        match &event.payload {
            EventPayload::StepStarted {
                step_id,
                node_id,
                node_type,
                label,
                input,
                ..
            } => {
                traced.steps.push(StepRecord::started(
                    *step_id,
                    event.run_id,
                    node_id.clone(),
                    *node_type,
                    label.clone(),
                    input.clone(),
                    event.timestamp,
                ));
            }
            EventPayload::StepCompleted {
                step_id,
                output,
                latency_ms,
                ..
            } => {
                if let Some(step) = traced.steps.iter_mut().find(|s| s.id == *step_id) {
                    step.complete(output.clone(), *latency_ms, event.timestamp);
                }
            }
            EventPayload::StepFailed {
                step_id,
                error,
                latency_ms,
                ..
            } => {
                if let Some(step) = traced.steps.iter_mut().find(|s| s.id == *step_id) {
                    step.fail(error.clone(), *latency_ms, event.timestamp);
                }
            }
            EventPayload::RunCompleted { output, .. } => {
                traced.run.complete(output.clone(), event.timestamp);
            }
            EventPayload::RunFailed { error } => {
                traced.run.fail(error.clone(), event.timestamp);
            }
            EventPayload::RunStarted { .. } | EventPayload::StepProgress { .. } => {}
        }
    }

    fn admit(&self, state: &mut TracerState, event: &RunEvent, canvas_id: &str, input: &Record) {
        if state.runs.contains_key(&event.run_id) {
            tracing::warn!("Run {} started twice; keeping the first record", event.run_id);
            return;
        }

        let mut run = Run::new(event.run_id, canvas_id, input.clone(), event.timestamp);
        run.status = RunStatus::Running;
        state.runs.insert(
            event.run_id,
            TracedRun {
                run,
                steps: Vec::new(),
            },
        );
        state.admitted.push_back(event.run_id);

        while state.admitted.len() > self.capacity {
            if let Some(oldest) = state.admitted.pop_front() {
                state.runs.remove(&oldest);
                tracing::debug!("Evicted run {} from tracer", oldest);
            }
        }
    }

    pub async fn get_run(&self, run_id: RunId) -> Option<Run> {
        let state = self.state.read().await;
        state.runs.get(&run_id).map(|t| t.run.clone())
    }

    /// Runs of a canvas, newest first
    pub async fn get_runs_by_canvas(&self, canvas_id: &str) -> Vec<Run> {
        let state = self.state.read().await;
        let mut runs: Vec<Run> = state
            .admitted
            .iter()
            .rev()
            .filter_map(|id| state.runs.get(id))
            .filter(|t| t.run.canvas_id == canvas_id)
            .map(|t| t.run.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Step records of a run in dispatch order; empty for unknown runs
    pub async fn get_run_steps(&self, run_id: RunId) -> Vec<StepRecord> {
        let state = self.state.read().await;
        state
            .runs
            .get(&run_id)
            .map(|t| t.steps.clone())
            .unwrap_or_default()
    }

    pub async fn get_step_output(&self, run_id: RunId, node_id: &str) -> Option<Record> {
        let state = self.state.read().await;
        state
            .runs
            .get(&run_id)?
            .steps
            .iter()
            .find(|s| s.node_id == node_id)
            .and_then(|s| s.output.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.runs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for EventTracer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACER_CAPACITY)
    }
}

#[async_trait]
impl EventSink for EventTracer {
    async fn emit(&self, event: &RunEvent) {
        self.record(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{NodeType, StepStatus};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn started(run_id: RunId, canvas_id: &str) -> RunEvent {
        RunEvent::new(
            run_id,
            EventPayload::RunStarted {
                canvas_id: canvas_id.into(),
                input: Record::new(),
                total_steps: 1,
            },
        )
    }

    fn output(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_rebuilds_run_and_steps_from_events() {
        let tracer = EventTracer::new(10);
        let run_id = Uuid::new_v4();
        let step_id = Uuid::new_v4();

        tracer.record(&started(run_id, "canvas")).await;
        tracer
            .record(&RunEvent::new(
                run_id,
                EventPayload::StepStarted {
                    step_id,
                    node_id: "q".into(),
                    node_type: NodeType::Query,
                    label: "Question".into(),
                    index: 0,
                    input: output(json!({"query": "hi"})),
                },
            ))
            .await;
        assert_eq!(tracer.get_run_steps(run_id).await[0].status, StepStatus::Running);

        tracer
            .record(&RunEvent::new(
                run_id,
                EventPayload::StepCompleted {
                    step_id,
                    node_id: "q".into(),
                    node_type: NodeType::Query,
                    label: "Question".into(),
                    index: 0,
                    output: output(json!({"query": "hi"})),
                    latency_ms: 3,
                },
            ))
            .await;
        tracer
            .record(&RunEvent::new(
                run_id,
                EventPayload::RunCompleted {
                    output: output(json!({"query": "hi"})),
                    total_latency_ms: 4,
                },
            ))
            .await;

        let run = tracer.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());

        let steps = tracer.get_run_steps(run_id).await;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[0].latency_ms, Some(3));
        assert_eq!(
            tracer.get_step_output(run_id, "q").await,
            Some(output(json!({"query": "hi"})))
        );
        assert_eq!(tracer.get_step_output(run_id, "missing").await, None);
    }

    #[tokio::test]
    async fn test_evicts_oldest_run_with_its_steps() {
        let tracer = EventTracer::new(2);
        let ids: Vec<RunId> = (0..3).map(|_| Uuid::new_v4()).collect();

        tracer.record(&started(ids[0], "c")).await;
        tracer
            .record(&RunEvent::new(
                ids[0],
                EventPayload::StepStarted {
                    step_id: Uuid::new_v4(),
                    node_id: "q".into(),
                    node_type: NodeType::Query,
                    label: String::new(),
                    index: 0,
                    input: Record::new(),
                },
            ))
            .await;
        tracer.record(&started(ids[1], "c")).await;
        tracer.record(&started(ids[2], "c")).await;

        assert_eq!(tracer.len().await, 2);
        assert!(tracer.get_run(ids[0]).await.is_none());
        assert!(tracer.get_run_steps(ids[0]).await.is_empty());
        assert!(tracer.get_run(ids[1]).await.is_some());
        assert!(tracer.get_run(ids[2]).await.is_some());
    }

    #[tokio::test]
    async fn test_events_for_evicted_runs_are_ignored() {
        let tracer = EventTracer::new(1);
        let old = Uuid::new_v4();
        tracer.record(&started(old, "c")).await;
        tracer.record(&started(Uuid::new_v4(), "c")).await;

        tracer
            .record(&RunEvent::new(old, EventPayload::RunFailed { error: "late".into() }))
            .await;
        assert!(tracer.get_run(old).await.is_none());
        assert_eq!(tracer.len().await, 1);
    }

    #[tokio::test]
    async fn test_runs_by_canvas_newest_first() {
        let tracer = EventTracer::default();
        let base = Utc::now();
        let mut expected = Vec::new();

        for offset in [5, 1, 3] {
            let id = Uuid::new_v4();
            let mut event = started(id, "canvas-a");
            event.timestamp = base + Duration::seconds(offset);
            tracer.record(&event).await;
            expected.push((offset, id));
        }
        tracer.record(&started(Uuid::new_v4(), "canvas-b")).await;

        expected.sort_by(|a, b| b.0.cmp(&a.0));
        let runs = tracer.get_runs_by_canvas("canvas-a").await;
        let got: Vec<RunId> = runs.iter().map(|r| r.id).collect();
        let want: Vec<RunId> = expected.into_iter().map(|(_, id)| id).collect();
        assert_eq!(got, want);
        assert!(tracer.get_runs_by_canvas("unknown").await.is_empty());
    }

    #[tokio::test]
    async fn test_step_failure_is_recorded() {
        let tracer = EventTracer::new(4);
        let run_id = Uuid::new_v4();
        let step_id = Uuid::new_v4();
        tracer.record(&started(run_id, "c")).await;
        tracer
            .emit(&RunEvent::new(
                run_id,
                EventPayload::StepStarted {
                    step_id,
                    node_id: "g".into(),
                    node_type: NodeType::Generate,
                    label: String::new(),
                    index: 0,
                    input: Record::new(),
                },
            ))
            .await;
        tracer
            .emit(&RunEvent::new(
                run_id,
                EventPayload::StepFailed {
                    step_id,
                    node_id: "g".into(),
                    node_type: NodeType::Generate,
                    label: String::new(),
                    index: 0,
                    error: "quota exceeded".into(),
                    latency_ms: 1,
                },
            ))
            .await;
        tracer
            .emit(&RunEvent::new(run_id, EventPayload::RunFailed { error: "quota exceeded".into() }))
            .await;

        let steps = tracer.get_run_steps(run_id).await;
        assert_eq!(steps[0].status, StepStatus::Failed);
        assert_eq!(steps[0].error.as_deref(), Some("quota exceeded"));
        assert_eq!(tracer.get_run(run_id).await.unwrap().status, RunStatus::Failed);
    }
}

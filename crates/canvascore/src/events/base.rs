use crate::{CanvasId, NodeId, NodeType, Record, RunId, StepId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Lifecycle event emitted while a run executes.
///
/// Serializes as `{"type": ..., "timestamp": ..., "runId": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: RunId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl RunEvent {
    pub fn new(run_id: RunId, payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            payload,
        }
    }

    /// Wire name of the event, e.g. `step:completed`
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    #[serde(rename = "run:started", rename_all = "camelCase")]
    RunStarted {
        canvas_id: CanvasId,
        input: Record,
        total_steps: usize,
    },
    #[serde(rename = "run:completed", rename_all = "camelCase")]
    RunCompleted { output: Record, total_latency_ms: u64 },
    #[serde(rename = "run:failed", rename_all = "camelCase")]
    RunFailed { error: String },
    #[serde(rename = "step:started", rename_all = "camelCase")]
    StepStarted {
        step_id: StepId,
        node_id: NodeId,
        node_type: NodeType,
        label: String,
        index: usize,
        input: Record,
    },
    #[serde(rename = "step:completed", rename_all = "camelCase")]
    StepCompleted {
        step_id: StepId,
        node_id: NodeId,
        node_type: NodeType,
        label: String,
        index: usize,
        output: Record,
        latency_ms: u64,
    },
    #[serde(rename = "step:failed", rename_all = "camelCase")]
    StepFailed {
        step_id: StepId,
        node_id: NodeId,
        node_type: NodeType,
        label: String,
        index: usize,
        error: String,
        latency_ms: u64,
    },
    /// Reserved for incremental step output; never emitted by the orchestrator.
    #[serde(rename = "step:progress", rename_all = "camelCase")]
    StepProgress { node_id: NodeId, data: Record },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::RunStarted { .. } => "run:started",
            EventPayload::RunCompleted { .. } => "run:completed",
            EventPayload::RunFailed { .. } => "run:failed",
            EventPayload::StepStarted { .. } => "step:started",
            EventPayload::StepCompleted { .. } => "step:completed",
            EventPayload::StepFailed { .. } => "step:failed",
            EventPayload::StepProgress { .. } => "step:progress",
        }
    }
}

/// Consumer of the run event stream.
///
/// The orchestrator awaits each `emit` before producing the next event, so a
/// sink sees the events of one run in exactly the order they were produced.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &RunEvent);
}

/// Broadcast bus for push-style subscribers (WebSocket clients, CLI printers).
///
/// Slow subscribers get `RecvError::Lagged` instead of silently missing events.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: &RunEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
    }
}

/// Lossless sink backed by an unbounded channel
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: &RunEvent) {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!("Event receiver dropped, discarding {}", event.kind());
        }
    }
}

/// Fans each event out to several sinks in registration order
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for SinkSet {
    async fn emit(&self, event: &RunEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}

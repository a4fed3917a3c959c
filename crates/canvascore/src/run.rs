use crate::{CanvasId, NodeId, NodeType, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RunId = Uuid;
pub type StepId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One execution attempt of a compiled canvas against an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub canvas_id: CanvasId,
    pub input: Record,
    pub status: RunStatus,
    pub output: Option<Record>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(id: RunId, canvas_id: impl Into<CanvasId>, input: Record, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            canvas_id: canvas_id.into(),
            input,
            status: RunStatus::Pending,
            output: None,
            error: None,
            started_at,
            completed_at: None,
        }
    }

    pub fn complete(&mut self, output: Record, at: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(at);
    }
}

/// Lifecycle and result of one node's execution within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: StepId,
    pub run_id: RunId,
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub label: String,
    pub status: StepStatus,
    pub input: Record,
    pub output: Option<Record>,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn started(
        id: StepId,
        run_id: RunId,
        node_id: impl Into<NodeId>,
        node_type: NodeType,
        label: impl Into<String>,
        input: Record,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            run_id,
            node_id: node_id.into(),
            node_type,
            label: label.into(),
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            latency_ms: None,
            started_at,
            completed_at: None,
        }
    }

    pub fn complete(&mut self, output: Record, latency_ms: u64, at: DateTime<Utc>) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, latency_ms: u64, at: DateTime<Utc>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self.completed_at = Some(at);
    }
}

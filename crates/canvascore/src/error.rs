use crate::{EdgeId, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable code attached to every validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    DuplicateNodeId,
    MissingEntryNode,
    MultipleEntryNodes,
    MissingTerminalNode,
    InvalidSource,
    InvalidTarget,
    InvalidConnection,
    CycleDetected,
    NoIncomingEdges,
    NoOutgoingEdges,
    MissingUpstream,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::DuplicateNodeId => "DUPLICATE_NODE_ID",
            IssueCode::MissingEntryNode => "MISSING_ENTRY_NODE",
            IssueCode::MultipleEntryNodes => "MULTIPLE_ENTRY_NODES",
            IssueCode::MissingTerminalNode => "MISSING_TERMINAL_NODE",
            IssueCode::InvalidSource => "INVALID_SOURCE",
            IssueCode::InvalidTarget => "INVALID_TARGET",
            IssueCode::InvalidConnection => "INVALID_CONNECTION",
            IssueCode::CycleDetected => "CYCLE_DETECTED",
            IssueCode::NoIncomingEdges => "NO_INCOMING_EDGES",
            IssueCode::NoOutgoingEdges => "NO_OUTGOING_EDGES",
            IssueCode::MissingUpstream => "MISSING_UPSTREAM",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural error or advisory warning about a canvas graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: None,
            edge_id: None,
        }
    }

    pub fn at_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn at_edge(mut self, edge_id: impl Into<EdgeId>) -> Self {
        self.edge_id = Some(edge_id.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_types(types: &[NodeType]) -> String {
    types.iter().map(NodeType::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Cyclic dependency detected: ordered {ordered} of {total} nodes")]
    CycleDetected { ordered: usize, total: usize },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge {edge_id} references unknown node: {node_id}")]
    UnknownNode { edge_id: EdgeId, node_id: NodeId },

    #[error("Invalid graph: {}", join_issues(.0))]
    InvalidGraph(Vec<ValidationIssue>),
}

/// Failure raised by a step executor. The orchestrator only records its message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepExecutionError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Reason a run ended in the failed state
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("No executor registered for node type '{node_type}' (node {node_id})")]
    UnknownStepType { node_id: NodeId, node_type: NodeType },

    #[error("Step {node_id} failed: {source}")]
    StepFailed {
        node_id: NodeId,
        #[source]
        source: StepExecutionError,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Executor registry is missing node types: {}", join_types(.0))]
    Incomplete(Vec<NodeType>),
}

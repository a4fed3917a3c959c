use crate::{NodeType, Record, StepExecutionError};
use async_trait::async_trait;

/// Execution capability for one node type.
///
/// Implementations own everything about what a node does, including any
/// retry or timeout policy; the orchestrator only sees the returned record
/// or the error message.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Node type this executor handles
    fn node_type(&self) -> NodeType;

    /// Execute with the resolved input and the node's static config
    async fn execute(&self, input: Record, config: &Record) -> Result<Record, StepExecutionError>;

    /// Optional: one-line description shown by tooling
    fn description(&self) -> &str {
        ""
    }
}

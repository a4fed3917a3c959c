//! Core abstractions for the canvas engine
//!
//! Graph model, run and step records, the lifecycle event stream and the
//! step executor contract. Everything else in the workspace builds on these
//! types; this crate has no knowledge of how graphs are compiled or run.

mod error;
pub mod events;
mod executor;
mod graph;
mod run;

pub use error::{
    IssueCode, PlanningError, RegistryError, RunError, StepExecutionError, ValidationIssue,
};
pub use events::*;
pub use executor::StepExecutor;
pub use graph::{CanvasEdge, CanvasGraph, CanvasId, CanvasNode, EdgeId, NodeId, NodeType, Record};
pub use run::{Run, RunId, RunStatus, StepId, StepRecord, StepStatus};

//! Canvas compilation and run orchestration
//!
//! Validates canvases, orders them, compiles execution plans and runs them
//! step by step against a registry of executors while emitting lifecycle
//! events to the tracer and any other sink.

mod orchestrator;
mod planner;
mod registry;
mod resolver;
mod runtime;
mod sorter;
mod tracer;
mod validator;

pub use orchestrator::{RunOrchestrator, RunReport};
pub use planner::{plan, plan_graph, ExecutionPlan, ExecutionStep};
pub use registry::ExecutorRegistry;
pub use resolver::{CompletedOutputs, InputBinding, InputPolicy, InputResolver};
pub use runtime::{CanvasRuntime, RuntimeConfig};
pub use sorter::{topological_order, TopologicalSorter};
pub use tracer::{EventTracer, DEFAULT_TRACER_CAPACITY};
pub use validator::{validate, ValidationResult};

use crate::orchestrator::{RunOrchestrator, RunReport};
use crate::planner::{self, ExecutionPlan};
use crate::registry::ExecutorRegistry;
use crate::resolver::InputResolver;
use crate::tracer::{EventTracer, DEFAULT_TRACER_CAPACITY};
use crate::validator::{self, ValidationResult};
use canvascore::{
    CanvasGraph, CanvasId, EventBus, EventSink, PlanningError, Record, RegistryError, RunEvent,
    SinkSet,
};
use serde::Deserialize;
use std::sync::Arc;

/// Main entry point: validates, plans and runs canvases against one registry
pub struct CanvasRuntime {
    orchestrator: RunOrchestrator,
    event_bus: Arc<EventBus>,
    tracer: Arc<EventTracer>,
    sinks: SinkSet,
}

impl CanvasRuntime {
    /// Create a runtime with a pre-configured registry
    pub fn with_registry(
        registry: Arc<ExecutorRegistry>,
        config: RuntimeConfig,
    ) -> Result<Self, RegistryError> {
        Self::with_resolver(registry, Arc::new(InputResolver::default()), config)
    }

    pub fn with_resolver(
        registry: Arc<ExecutorRegistry>,
        resolver: Arc<InputResolver>,
        config: RuntimeConfig,
    ) -> Result<Self, RegistryError> {
        if config.require_complete_registry {
            registry.ensure_complete()?;
        } else if !registry.missing_types().is_empty() {
            tracing::warn!(
                "No executors for node types {:?}; runs using them will fail",
                registry.missing_types()
            );
        }

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let tracer = Arc::new(EventTracer::new(config.tracer_capacity));
        // Tracer first so a subscriber reacting to an event can already query it
        let sinks = SinkSet::new()
            .with(tracer.clone() as Arc<dyn EventSink>)
            .with(event_bus.clone() as Arc<dyn EventSink>);

        Ok(Self {
            orchestrator: RunOrchestrator::with_resolver(registry, resolver),
            event_bus,
            tracer,
            sinks,
        })
    }

    /// Get access to the executor registry
    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        self.orchestrator.registry()
    }

    pub fn validate(&self, graph: &CanvasGraph) -> ValidationResult {
        validator::validate(&graph.nodes, &graph.edges)
    }

    pub fn plan(&self, graph: &CanvasGraph) -> Result<ExecutionPlan, PlanningError> {
        planner::plan_graph(graph)
    }

    /// Execute a canvas, publishing events to the tracer and the bus
    pub async fn run(&self, canvas_id: impl Into<CanvasId>, graph: &CanvasGraph, input: Record) -> RunReport {
        self.orchestrator
            .execute(canvas_id, graph, input, &self.sinks)
            .await
    }

    /// Execute a canvas with an extra sink that sees every event after the built-in ones
    pub async fn run_with_sink(
        &self,
        canvas_id: impl Into<CanvasId>,
        graph: &CanvasGraph,
        input: Record,
        sink: Arc<dyn EventSink>,
    ) -> RunReport {
        let sinks = self.sinks.clone().with(sink);
        self.orchestrator
            .execute(canvas_id, graph, input, &sinks)
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tracer(&self) -> &Arc<EventTracer> {
        &self.tracer
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    pub tracer_capacity: usize,
    pub require_complete_registry: bool,
}

impl RuntimeConfig {
    /// Defaults overridden by `CANVAS_EVENT_BUFFER`, `CANVAS_TRACER_CAPACITY`
    /// and `CANVAS_REQUIRE_COMPLETE_REGISTRY`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, "CANVAS_EVENT_BUFFER") {
            config.event_buffer_size = value;
        }
        if let Some(value) = parse_var(&lookup, "CANVAS_TRACER_CAPACITY") {
            config.tracer_capacity = value;
        }
        if let Some(value) = parse_var(&lookup, "CANVAS_REQUIRE_COMPLETE_REGISTRY") {
            config.require_complete_registry = value;
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            tracer_capacity: DEFAULT_TRACER_CAPACITY,
            require_complete_registry: false,
        }
    }
}

use canvascore::{NodeType, RegistryError, StepExecutor};
use std::collections::HashMap;
use std::sync::Arc;

/// One step executor per node type, supplied wholesale by the host.
///
/// Build it once and hand it to the orchestrator behind an `Arc`; separate
/// registries can coexist, e.g. one per test.
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor, replacing any previous one for the same type
    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        let node_type = executor.node_type();
        tracing::info!("Registering executor for node type: {}", node_type);
        if self.executors.insert(node_type, executor).is_some() {
            tracing::warn!("Replaced existing executor for node type: {}", node_type);
        }
    }

    pub fn with(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(&node_type).cloned()
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.executors.contains_key(&node_type)
    }

    /// Registered node types in declaration order
    pub fn list_node_types(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| self.executors.contains_key(t))
            .collect()
    }

    pub fn missing_types(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| !self.executors.contains_key(t))
            .collect()
    }

    /// Fail unless every node type has an executor
    pub fn ensure_complete(&self) -> Result<(), RegistryError> {
        let missing = self.missing_types();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Incomplete(missing))
        }
    }

    pub fn description(&self, node_type: NodeType) -> Option<String> {
        self.executors
            .get(&node_type)
            .map(|e| e.description().to_string())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

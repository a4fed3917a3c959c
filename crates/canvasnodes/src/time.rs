use async_trait::async_trait;
use canvascore::{NodeType, Record, StepExecutionError, StepExecutor};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

const DEFAULT_DELAY_MS: u64 = 1000;

/// Delay execution for the configured `delay_ms`, then pass the input through
pub struct DelayExecutor {
    node_type: NodeType,
}

impl DelayExecutor {
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }
}

#[async_trait]
impl StepExecutor for DelayExecutor {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    async fn execute(&self, input: Record, config: &Record) -> Result<Record, StepExecutionError> {
        let delay_ms = config
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_DELAY_MS);

        tracing::debug!("[{}] delaying for {}ms", self.node_type, delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;

        Ok(input)
    }

    fn description(&self) -> &str {
        "Delay execution for specified milliseconds"
    }
}

/// Caps the wall-clock time of another executor.
///
/// The orchestrator never times a step out itself; hosts wrap slow nodes.
pub struct WithTimeout {
    inner: Arc<dyn StepExecutor>,
    limit: Duration,
}

impl WithTimeout {
    pub fn new(inner: Arc<dyn StepExecutor>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl StepExecutor for WithTimeout {
    fn node_type(&self) -> NodeType {
        self.inner.node_type()
    }

    async fn execute(&self, input: Record, config: &Record) -> Result<Record, StepExecutionError> {
        match timeout(self.limit, self.inner.execute(input, config)).await {
            Ok(result) => result,
            Err(_) => Err(StepExecutionError::ExecutionFailed(format!(
                "timed out after {}ms",
                self.limit.as_millis()
            ))),
        }
    }

    fn description(&self) -> &str {
        self.inner.description()
    }
}

use async_trait::async_trait;
use canvascore::{NodeType, Record, StepExecutionError, StepExecutor};

/// Pass-through executor that logs its input and returns it.
///
/// Stands in for real node bodies when wiring or debugging a canvas.
pub struct EchoExecutor {
    node_type: NodeType,
}

impl EchoExecutor {
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }
}

#[async_trait]
impl StepExecutor for EchoExecutor {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    async fn execute(&self, input: Record, config: &Record) -> Result<Record, StepExecutionError> {
        tracing::info!(
            "[{}] input fields: {:?}",
            self.node_type,
            input.keys().collect::<Vec<_>>()
        );

        let mut output = input;
        // `emit` lets a demo canvas fake the fields a real node would produce
        if let Some(emit) = config.get("emit") {
            let extra = emit.as_object().ok_or_else(|| {
                StepExecutionError::Configuration("`emit` must be an object".to_string())
            })?;
            for (key, value) in extra {
                output.insert(key.clone(), value.clone());
            }
        }
        Ok(output)
    }

    fn description(&self) -> &str {
        "Returns its resolved input plus any `emit` config fields"
    }
}

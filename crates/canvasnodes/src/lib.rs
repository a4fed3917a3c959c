//! Reference executors
//!
//! Pass-through and timing executors for demos and tests. Real node bodies
//! (embedding, retrieval, generation, ...) are supplied by the host process.

mod echo;
mod time;

pub use echo::EchoExecutor;
pub use time::{DelayExecutor, WithTimeout};
use canvascore::NodeType;
use canvasruntime::ExecutorRegistry;

use std::sync::Arc;

/// Register a pass-through executor for every node type
pub fn register_all(registry: &mut ExecutorRegistry) {
    for node_type in NodeType::ALL {
        registry.register(Arc::new(EchoExecutor::new(node_type)));
    }
}

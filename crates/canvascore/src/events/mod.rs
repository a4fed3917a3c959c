// crates/canvascore/src/events/mod.rs

mod base;

pub use base::{ChannelSink, EventBus, EventPayload, EventSink, RunEvent, SinkSet};

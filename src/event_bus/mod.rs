//! Event bus: the engine's notification seam toward the (excluded)
//! renderer.
//!
//! The orchestrator and poller emit [`Event`]s through a [`flume`] channel;
//! [`EventBus`] fans them out to pluggable [`EventSink`]s (stdout, memory
//! capture for tests, or a tokio channel toward a live subscriber). A
//! surface interested in one node subscribes through
//! [`EventBus::subscribe_node`] and unsubscribes by dropping its receiver.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{Event, JobPhase};
pub use sink::{ChannelSink, EventSink, LineSink, MemorySink, StdOutSink};

use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::event::Event;
use crate::types::NodeId;

/// Abstraction over an output target that consumes full Event objects.
pub trait EventSink: Sync + Send {
    /// Handle a structured event. Sink decides how to serialize/format it.
    ///
    /// A `BrokenPipe` error tells the bus the consumer is gone for good;
    /// the bus drops the sink instead of retrying it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Writes one display line per event to any writer.
pub struct LineSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

/// Stdout sink, one display line per event.
pub type StdOutSink = LineSink<Stdout>;

impl Default for LineSink<Stdout> {
    fn default() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + Sync> EventSink for LineSink<W> {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.out, "{event}")?;
        self.out.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    seen: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }

    /// Captured events concerning one node, in arrival order.
    pub fn for_node(&self, node: &str) -> Vec<Event> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.node() == node)
            .cloned()
            .collect()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink streaming to an async consumer (e.g. a renderer
/// surface), optionally scoped to a single node's events.
///
/// A dropped receiver surfaces as `BrokenPipe`, which unregisters the sink.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
    only: Option<NodeId>,
}

impl ChannelSink {
    /// Forward every event.
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx, only: None }
    }

    /// Forward only events concerning `node`.
    pub fn for_node(tx: mpsc::UnboundedSender<Event>, node: impl Into<NodeId>) -> Self {
        Self {
            tx,
            only: Some(node.into()),
        }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        if let Some(node) = &self.only
            && event.node() != node
        {
            return Ok(());
        }
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "subscriber dropped"))
    }
}

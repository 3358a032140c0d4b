use std::io;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task;

use super::event::Event;
use super::sink::{ChannelSink, EventSink, StdOutSink};
use crate::types::NodeId;

/// Fans engine events out to registered sinks and subscribers.
///
/// Producers hold a cheap [`flume::Sender`] clone obtained from
/// [`get_sender`](Self::get_sender); a background task started by
/// [`listen_for_events`](Self::listen_for_events) delivers each event to
/// every registered sink. A sink that reports `BrokenPipe` (its consumer
/// went away) is unregistered on the spot, so a renderer surface
/// unsubscribes simply by dropping its receiver.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Register an additional sink.
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    /// Stream every event to the returned receiver. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(ChannelSink::new(tx));
        rx
    }

    /// Stream only the events concerning `node`. A canvas surface showing a
    /// single node's progress subscribes here instead of filtering the
    /// whole firehose.
    pub fn subscribe_node(&self, node: impl Into<NodeId>) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(ChannelSink::for_node(tx, node));
        rx
    }

    /// Number of currently registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().expect("sinks poisoned").len()
    }

    /// Get a clone of the sender side so producers can emit events.
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.channel.0.clone()
    }

    /// Spawn the background delivery task. Idempotent: calling it again
    /// while a listener runs has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Deliver everything already queued before exiting,
                        // so stop_listener doubles as a flush.
                        while let Ok(event) = receiver.try_recv() {
                            deliver(&sinks, &event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break, // all senders dropped
                        Ok(event) => deliver(&sinks, &event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener after flushing queued events.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

/// Hand `event` to every sink, unregistering the ones whose consumer is
/// gone.
fn deliver(sinks: &Mutex<Vec<Box<dyn EventSink>>>, event: &Event) {
    let mut guard = sinks.lock().expect("sinks poisoned");
    guard.retain_mut(|sink| match sink.handle(event) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(node = event.node(), "event subscriber gone; sink removed");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "event sink failed");
            true
        }
    });
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

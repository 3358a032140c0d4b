//! Fan-out, per-node subscriptions, and subscriber lifecycle of the engine
//! event bus.

use musegraph::event_bus::{Event, EventBus, MemorySink};
use musegraph::types::NodeStatus;

#[tokio::test]
async fn bus_fans_out_to_every_sink() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(memory.clone());
    let mut rx = bus.subscribe();
    bus.listen_for_events();

    let sender = bus.get_sender();
    sender.send(Event::status("n1", NodeStatus::Running)).unwrap();
    sender.send(Event::failed("n1", "backend down")).unwrap();

    // Stopping flushes everything already queued.
    bus.stop_listener().await;

    let captured = memory.snapshot();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].node(), "n1");
    assert!(matches!(
        captured[1],
        Event::Status {
            status: NodeStatus::Failed,
            ..
        }
    ));

    assert_eq!(rx.recv().await.unwrap().node(), "n1");
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn node_subscriptions_only_see_their_node() {
    let bus = EventBus::with_sink(MemorySink::new());
    let mut rx = bus.subscribe_node("gen");
    bus.listen_for_events();

    let sender = bus.get_sender();
    sender.send(Event::status("other", NodeStatus::Running)).unwrap();
    sender.send(Event::result_ready("gen", "image")).unwrap();
    sender.send(Event::status("other", NodeStatus::Succeeded)).unwrap();

    bus.stop_listener().await;
    drop(bus);

    let only = rx.recv().await.unwrap();
    assert!(matches!(only, Event::ResultReady { .. }));
    assert_eq!(only.node(), "gen");
    assert!(rx.recv().await.is_none(), "filtered events must not arrive");
}

#[tokio::test]
async fn dropped_subscribers_are_unregistered() {
    let bus = EventBus::with_sink(MemorySink::new());
    let rx = bus.subscribe_node("gen");
    assert_eq!(bus.sink_count(), 2);

    drop(rx);
    bus.listen_for_events();
    bus.get_sender()
        .send(Event::result_ready("gen", "image"))
        .unwrap();
    bus.stop_listener().await;

    assert_eq!(bus.sink_count(), 1);
}

#[tokio::test]
async fn listening_twice_is_idempotent() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(memory.clone());
    bus.listen_for_events();
    bus.listen_for_events();

    bus.get_sender()
        .send(Event::result_ready("gen", "image"))
        .unwrap();
    bus.stop_listener().await;

    // A duplicate listener would double-deliver.
    assert_eq!(memory.snapshot().len(), 1);
}

#[tokio::test]
async fn memory_sink_answers_per_node_queries() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(memory.clone());
    bus.listen_for_events();

    let sender = bus.get_sender();
    sender.send(Event::status("a", NodeStatus::Running)).unwrap();
    sender.send(Event::status("b", NodeStatus::Running)).unwrap();
    sender.send(Event::status("a", NodeStatus::Succeeded)).unwrap();
    bus.stop_listener().await;

    let a_events = memory.for_node("a");
    assert_eq!(a_events.len(), 2);
    assert!(a_events.iter().all(|e| e.node() == "a"));
    assert_eq!(memory.snapshot().len(), 3);
}

//! Shared fixtures: canned graphs, raster helpers, and a wired test rig.

use std::sync::Arc;

use musegraph::event_bus::Event;
use musegraph::graph::{Edge, Graph, GraphStore};
use musegraph::media::MediaRef;
use musegraph::node::{Node, NodePayload};
use musegraph::runtime::{Backends, Orchestrator, RuntimeConfig};
use musegraph::types::NodeStatus;

use super::backends::{
    MapFetcher, MemoryStager, RecordingBackend, RecordingHistory, ScriptedVideoBackend,
};

/// Encode an opaque gray PNG of the given dimensions.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([128, 128, 128, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}

/// An embedded PNG reference of the given dimensions.
pub fn embedded_png(width: u32, height: u32) -> MediaRef {
    MediaRef::from_bytes("image/png", &png_bytes(width, height))
}

/// A prompt node wired into a generate node, plus any extra nodes/edges the
/// test layers on.
pub fn prompt_and_generate(prompt: &str) -> Graph {
    Graph::default()
        .with_node(Node::with_id("prompt", NodePayload::prompt(prompt)))
        .with_node(Node::with_id("gen", NodePayload::generate()))
        .with_edge(Edge::new("prompt", "text", "gen", "text"))
}

/// Clone a node's payload out of the store's current snapshot.
pub fn payload_of(store: &GraphStore, id: &str) -> NodePayload {
    store
        .snapshot()
        .node(id)
        .unwrap_or_else(|| panic!("node {id} missing"))
        .payload
        .clone()
}

/// A node's current status.
pub fn status_of(store: &GraphStore, id: &str) -> NodeStatus {
    store
        .snapshot()
        .node(id)
        .unwrap_or_else(|| panic!("node {id} missing"))
        .status
}

/// Orchestrator plus every mock it talks to, ready to run.
pub struct Rig {
    pub store: GraphStore,
    pub generation: RecordingBackend,
    pub video: ScriptedVideoBackend,
    pub stager: MemoryStager,
    pub fetcher: MapFetcher,
    pub history: RecordingHistory,
    pub orchestrator: Orchestrator,
    events: flume::Receiver<Event>,
}

impl Rig {
    pub fn new(graph: Graph) -> Self {
        Self::with_config(graph, RuntimeConfig::default())
    }

    pub fn with_config(graph: Graph, config: RuntimeConfig) -> Self {
        let store = GraphStore::new(graph);
        let generation = RecordingBackend::new();
        let video = ScriptedVideoBackend::new();
        let stager = MemoryStager::new();
        let fetcher = MapFetcher::new();
        let history = RecordingHistory::new();
        let backends = Backends {
            generation: Arc::new(generation.clone()),
            video: Arc::new(video.clone()),
            stager: Arc::new(stager.clone()),
            fetcher: Arc::new(fetcher.clone()),
            history: Arc::new(history.clone()),
        };
        let (tx, events) = flume::unbounded();
        let orchestrator =
            Orchestrator::new(store.clone(), backends, config).with_event_sender(tx);
        Self {
            store,
            generation,
            video,
            stager,
            fetcher,
            history,
            orchestrator,
            events,
        }
    }

    /// Everything emitted so far, in order.
    pub fn drained_events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }
}

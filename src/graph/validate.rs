//! Connection legality rules.
//!
//! A candidate [`Connection`] is legal when it is not a self-loop, both
//! endpoints exist, the target `(node type, port id)` pair appears in the
//! compatibility table, the source node produces the kind the port accepts,
//! and the specific source port is admissible (a multi-output node's
//! indexed single-frame ports and its full-collection port are accepted by
//! different targets).
//!
//! The table is an exhaustive `match` over [`NodeType`], so adding a node
//! variant without deciding its ports is a compile error, not a silent
//! "nothing connects" hole.

use serde::{Deserialize, Serialize};

use super::store::Graph;
use crate::node::{Node, NodePayload, NodeType};
use crate::types::{NodeId, PortId, slot_index};

/// Fan-in behaviour of an input port, applied by
/// [`connect`](crate::graph::connect) before edge insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// At most one edge; a new connection replaces the existing one(s).
    ReplaceSingle,
    /// Bounded fan-in; when full, the oldest-inserted edges are evicted to
    /// make room.
    CappedEvict(usize),
    /// Bounded fan-in; when full, the connection is refused.
    CappedReject(usize),
    /// Larger ordered fan-in; accepted until the cap, insertion order kept.
    AppendOrdered(usize),
}

impl CapacityPolicy {
    /// The maximum number of edges this policy lets terminate on a port.
    #[must_use]
    pub fn limit(&self) -> usize {
        match self {
            Self::ReplaceSingle => 1,
            Self::CappedEvict(n) | Self::CappedReject(n) | Self::AppendOrdered(n) => *n,
        }
    }
}

/// What a port accepts, in terms of source node output kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepts {
    TextProducers,
    ImageProducers,
    VideoProducers,
}

/// One row of the compatibility table.
#[derive(Clone, Copy, Debug)]
pub struct PortRule {
    pub accepts: Accepts,
    pub policy: CapacityPolicy,
}

impl PortRule {
    const fn new(accepts: Accepts, policy: CapacityPolicy) -> Self {
        Self { accepts, policy }
    }
}

/// A candidate edge, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: NodeId,
    pub source_port: PortId,
    pub target: NodeId,
    pub target_port: PortId,
}

impl Connection {
    #[must_use]
    pub fn new(
        source: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        target: impl Into<NodeId>,
        target_port: impl Into<PortId>,
    ) -> Self {
        Self {
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
        }
    }
}

/// Look up the rule for a target node's input port.
///
/// Returns `None` for ports that do not exist on that node type, which makes
/// any connection to them illegal. Video provider ports depend on the
/// concrete provider, so the whole payload is consulted rather than just the
/// type tag.
#[must_use]
pub fn port_rule(target: &Node, target_port: &str) -> Option<PortRule> {
    use CapacityPolicy::*;

    match target.node_type() {
        NodeType::Generate => match target_port {
            "text" => Some(PortRule::new(Accepts::TextProducers, ReplaceSingle)),
            "image" => Some(PortRule::new(Accepts::ImageProducers, CappedReject(6))),
            _ => None,
        },
        // Batch generation shares the single-output node's port surface.
        NodeType::MultiGenerate => match target_port {
            "text" => Some(PortRule::new(Accepts::TextProducers, ReplaceSingle)),
            "image" => Some(PortRule::new(Accepts::ImageProducers, CappedReject(6))),
            _ => None,
        },
        NodeType::ReferenceGenerate => match target_port {
            "text" => Some(PortRule::new(Accepts::TextProducers, ReplaceSingle)),
            "image-1" | "image-2" => Some(PortRule::new(Accepts::ImageProducers, ReplaceSingle)),
            _ => None,
        },
        NodeType::ImageSplit => match target_port {
            "img" => Some(PortRule::new(Accepts::ImageProducers, ReplaceSingle)),
            _ => None,
        },
        NodeType::ImageGrid => match target_port {
            "image" => Some(PortRule::new(Accepts::ImageProducers, CappedReject(9))),
            _ => None,
        },
        NodeType::Analysis => match target_port {
            "text" => Some(PortRule::new(Accepts::TextProducers, ReplaceSingle)),
            "image" => Some(PortRule::new(Accepts::ImageProducers, ReplaceSingle)),
            _ => None,
        },
        NodeType::VideoProvider => {
            let NodePayload::VideoProvider { provider, .. } = &target.payload else {
                return None;
            };
            match target_port {
                "text" => Some(PortRule::new(Accepts::TextProducers, ReplaceSingle)),
                "image" => Some(PortRule::new(
                    Accepts::ImageProducers,
                    CappedEvict(provider.image_capacity()),
                )),
                _ => None,
            }
        }
        NodeType::VideoCompose => match target_port {
            "video-1" | "video-2" | "video-3" => {
                Some(PortRule::new(Accepts::VideoProducers, ReplaceSingle))
            }
            _ => None,
        },
        NodeType::PromptAggregate => match target_port {
            "text" => Some(PortRule::new(Accepts::TextProducers, AppendOrdered(20))),
            _ => None,
        },
        NodeType::FrameExtract => match target_port {
            "video" => Some(PortRule::new(Accepts::VideoProducers, ReplaceSingle)),
            _ => None,
        },
        // Pure sources: no input ports.
        NodeType::Prompt | NodeType::Note | NodeType::Image => None,
    }
}

/// Is the specific *source port* admissible for this target rule?
///
/// A multi-output batch node exposes indexed single-frame ports
/// (`image-0`..`image-{K-1}`) and a `collection` port carrying all slots at
/// once. Single-image consumers only accept the indexed ports; the grid
/// composite additionally accepts the collection.
fn source_port_admissible(source: &Node, source_port: &str, target_type: NodeType) -> bool {
    if source.node_type() != NodeType::MultiGenerate {
        return true;
    }
    match source_port {
        "collection" => target_type == NodeType::ImageGrid,
        port => slot_index(port).is_some(),
    }
}

fn kind_matches(accepts: Accepts, source: &NodePayload) -> bool {
    match accepts {
        Accepts::TextProducers => source.produces_text(),
        Accepts::ImageProducers => source.produces_image(),
        Accepts::VideoProducers => source.produces_video(),
    }
}

/// Decide legality of a candidate connection against a graph snapshot.
///
/// Capacity is *not* considered here; a legal connection to a full
/// `CappedReject` port is refused by [`connect`](crate::graph::connect)
/// instead. Illegal candidates are rejected without mutating anything.
#[must_use]
pub fn is_valid_connection(graph: &Graph, candidate: &Connection) -> bool {
    if candidate.source == candidate.target {
        return false;
    }
    let (Some(source), Some(target)) = (
        graph.node(&candidate.source),
        graph.node(&candidate.target),
    ) else {
        return false;
    };
    let Some(rule) = port_rule(target, &candidate.target_port) else {
        return false;
    };
    kind_matches(rule.accepts, &source.payload)
        && source_port_admissible(source, &candidate.source_port, target.node_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodePayload, VideoProviderKind};

    fn graph() -> Graph {
        Graph::default()
            .with_node(Node::with_id("prompt", NodePayload::prompt("hi")))
            .with_node(Node::with_id("img", NodePayload::image(None)))
            .with_node(Node::with_id("gen", NodePayload::generate()))
            .with_node(Node::with_id("batch", NodePayload::multi_generate(4)))
            .with_node(Node::with_id("grid", NodePayload::ImageGrid {
                cells: vec![None; 9],
                composited: None,
            }))
            .with_node(Node::with_id(
                "vidu",
                NodePayload::video_provider(VideoProviderKind::Vidu),
            ))
    }

    #[test]
    fn self_loops_are_illegal() {
        let g = graph();
        assert!(!is_valid_connection(
            &g,
            &Connection::new("gen", "image", "gen", "image")
        ));
    }

    #[test]
    fn missing_endpoints_are_illegal() {
        let g = graph();
        assert!(!is_valid_connection(
            &g,
            &Connection::new("ghost", "text", "gen", "text")
        ));
        assert!(!is_valid_connection(
            &g,
            &Connection::new("prompt", "text", "ghost", "text")
        ));
    }

    #[test]
    fn kind_compatibility_is_enforced() {
        let g = graph();
        // text → generate.text: ok
        assert!(is_valid_connection(
            &g,
            &Connection::new("prompt", "text", "gen", "text")
        ));
        // text → generate.image: wrong kind
        assert!(!is_valid_connection(
            &g,
            &Connection::new("prompt", "text", "gen", "image")
        ));
        // image → generate.text: wrong kind
        assert!(!is_valid_connection(
            &g,
            &Connection::new("img", "image", "gen", "text")
        ));
        // image → videoProvider.image: ok
        assert!(is_valid_connection(
            &g,
            &Connection::new("img", "image", "vidu", "image")
        ));
    }

    #[test]
    fn unknown_target_port_is_illegal() {
        let g = graph();
        assert!(!is_valid_connection(
            &g,
            &Connection::new("prompt", "text", "gen", "prompt")
        ));
    }

    #[test]
    fn batch_source_ports_are_filtered() {
        let g = graph();
        // Indexed single-frame port into a single-image consumer: ok.
        assert!(is_valid_connection(
            &g,
            &Connection::new("batch", "image-2", "gen", "image")
        ));
        // The full-collection port only feeds the grid composite.
        assert!(!is_valid_connection(
            &g,
            &Connection::new("batch", "collection", "gen", "image")
        ));
        assert!(is_valid_connection(
            &g,
            &Connection::new("batch", "collection", "grid", "image")
        ));
    }
}

//! Capacity enforcement and the gated connect path.
//!
//! [`connect`] is the only sanctioned way to add an edge on behalf of a user
//! action: it validates the candidate, applies the target port's
//! [`CapacityPolicy`](super::validate::CapacityPolicy), and returns a new
//! graph snapshot. A refused connection leaves the graph untouched.
//!
//! Eviction order for `CappedEvict` ports is oldest-inserted first; the edge
//! list's insertion order is the source of truth.

use miette::Diagnostic;
use thiserror::Error;

use super::edge::Edge;
use super::store::Graph;
use super::validate::{CapacityPolicy, Connection, is_valid_connection, port_rule};
use crate::types::{NodeId, PortId};

/// Why a connect attempt was refused.
#[derive(Debug, Error, Diagnostic)]
pub enum ConnectError {
    /// The candidate failed type/port validation. The graph is unchanged;
    /// the UI treats this as a silent no-drop.
    #[error(
        "illegal connection: {source_port} of {source_node} does not connect to {target_port} of {target_node}"
    )]
    #[diagnostic(code(musegraph::connect::invalid))]
    Invalid {
        source_node: NodeId,
        source_port: PortId,
        target_node: NodeId,
        target_port: PortId,
    },

    /// The target port is at capacity under a reject policy.
    #[error("port {port} of {target} is full (capacity {capacity})")]
    #[diagnostic(
        code(musegraph::connect::port_full),
        help("Disconnect an existing edge first; this port does not evict.")
    )]
    PortFull {
        target: String,
        port: PortId,
        capacity: usize,
    },
}

/// Would [`connect`] accept this candidate right now?
///
/// Mirrors `connect` without mutating: legality plus room under a
/// `CappedReject` policy. Replace/evict/append ports always have room for a
/// legal candidate.
#[must_use]
pub fn can_accept_connection(graph: &Graph, candidate: &Connection) -> bool {
    if !is_valid_connection(graph, candidate) {
        return false;
    }
    let Some(target) = graph.node(&candidate.target) else {
        return false;
    };
    let Some(rule) = port_rule(target, &candidate.target_port) else {
        return false;
    };
    match rule.policy {
        CapacityPolicy::CappedReject(n) | CapacityPolicy::AppendOrdered(n) => {
            graph
                .edges_in(&candidate.target, Some(&candidate.target_port))
                .count()
                < n
        }
        CapacityPolicy::ReplaceSingle | CapacityPolicy::CappedEvict(_) => true,
    }
}

/// Validate, apply the capacity policy, and insert the edge.
pub fn connect(graph: &Graph, candidate: &Connection) -> Result<Graph, ConnectError> {
    if !is_valid_connection(graph, candidate) {
        return Err(ConnectError::Invalid {
            source_node: candidate.source.clone(),
            source_port: candidate.source_port.clone(),
            target_node: candidate.target.clone(),
            target_port: candidate.target_port.clone(),
        });
    }

    // Validation guarantees the target and rule exist.
    let target = graph
        .node(&candidate.target)
        .expect("validated target exists");
    let rule = port_rule(target, &candidate.target_port).expect("validated rule exists");

    let existing: Vec<String> = graph
        .edges_in(&candidate.target, Some(&candidate.target_port))
        .map(|e| e.id.clone())
        .collect();

    let mut next = graph.clone();
    match rule.policy {
        CapacityPolicy::ReplaceSingle => {
            for id in &existing {
                next = next.without_edge(id);
            }
        }
        CapacityPolicy::CappedEvict(n) => {
            if existing.len() >= n {
                // Evict enough of the oldest-inserted edges to make room.
                let overflow = existing.len() + 1 - n;
                for id in existing.iter().take(overflow) {
                    next = next.without_edge(id);
                }
            }
        }
        CapacityPolicy::CappedReject(n) | CapacityPolicy::AppendOrdered(n) => {
            if existing.len() >= n {
                return Err(ConnectError::PortFull {
                    target: candidate.target.clone(),
                    port: candidate.target_port.clone(),
                    capacity: n,
                });
            }
        }
    }

    Ok(next.with_edge(Edge::new(
        candidate.source.clone(),
        candidate.source_port.clone(),
        candidate.target.clone(),
        candidate.target_port.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodePayload, VideoProviderKind};

    fn base() -> Graph {
        let mut g = Graph::default()
            .with_node(Node::with_id("gen", NodePayload::generate()))
            .with_node(Node::with_id(
                "kling",
                NodePayload::video_provider(VideoProviderKind::Kling),
            ))
            .with_node(Node::with_id("agg", NodePayload::prompt_aggregate()));
        for i in 0..24 {
            g = g
                .with_node(Node::with_id(
                    format!("img{i}"),
                    NodePayload::image(None),
                ))
                .with_node(Node::with_id(
                    format!("txt{i}"),
                    NodePayload::prompt(format!("p{i}")),
                ));
        }
        g
    }

    #[test]
    fn replace_single_swaps_the_edge() {
        let g = base();
        let g = connect(&g, &Connection::new("txt0", "text", "gen", "text")).unwrap();
        let g = connect(&g, &Connection::new("txt1", "text", "gen", "text")).unwrap();
        let edges: Vec<_> = g.edges_in("gen", Some("text")).collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, "txt1");
    }

    #[test]
    fn capped_reject_refuses_seventh_image() {
        let mut g = base();
        for i in 0..6 {
            g = connect(
                &g,
                &Connection::new(format!("img{i}"), "image", "gen", "image"),
            )
            .unwrap();
        }
        let err = connect(&g, &Connection::new("img6", "image", "gen", "image")).unwrap_err();
        assert!(matches!(err, ConnectError::PortFull { capacity: 6, .. }));
        assert_eq!(g.edges_in("gen", Some("image")).count(), 6);
    }

    #[test]
    fn capped_evict_drops_oldest_first() {
        let mut g = base();
        for i in 0..5 {
            g = connect(
                &g,
                &Connection::new(format!("img{i}"), "image", "kling", "image"),
            )
            .unwrap();
        }
        // Kling caps at 4: img0 must have been evicted, order preserved.
        let sources: Vec<_> = g
            .edges_in("kling", Some("image"))
            .map(|e| e.source.as_str())
            .collect();
        assert_eq!(sources, vec!["img1", "img2", "img3", "img4"]);
    }

    #[test]
    fn append_ordered_keeps_insertion_order_up_to_cap() {
        let mut g = base();
        for i in 0..20 {
            g = connect(
                &g,
                &Connection::new(format!("txt{i}"), "text", "agg", "text"),
            )
            .unwrap();
        }
        assert!(matches!(
            connect(&g, &Connection::new("txt20", "text", "agg", "text")),
            Err(ConnectError::PortFull { capacity: 20, .. })
        ));
        let first: Vec<_> = g
            .edges_in("agg", Some("text"))
            .take(3)
            .map(|e| e.source.as_str())
            .collect();
        assert_eq!(first, vec!["txt0", "txt1", "txt2"]);
    }

    #[test]
    fn invalid_error_names_both_endpoints() {
        let g = base();
        let err = connect(&g, &Connection::new("txt0", "text", "gen", "image")).unwrap_err();
        match &err {
            ConnectError::Invalid {
                source_node,
                target_node,
                ..
            } => {
                assert_eq!(source_node, "txt0");
                assert_eq!(target_node, "gen");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "illegal connection: text of txt0 does not connect to image of gen"
        );
    }

    #[test]
    fn invalid_candidate_leaves_graph_untouched() {
        let g = base();
        let before = g.edge_count();
        assert!(connect(&g, &Connection::new("gen", "image", "gen", "image")).is_err());
        assert_eq!(g.edge_count(), before);
    }
}

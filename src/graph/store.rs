//! Copy-on-write graph store.
//!
//! [`Graph`] is an immutable value: every mutation primitive consumes or
//! borrows a graph and returns a *new* snapshot, never editing the prior one
//! in place. [`GraphStore`] is the single piece of shared mutable state in
//! the engine: it holds the current `Arc<Graph>` and swaps it wholesale, so
//! an in-flight resolution that grabbed a snapshot keeps reading a
//! consistent view while runs on other nodes commit.
//!
//! # Examples
//!
//! ```rust
//! use musegraph::graph::{Edge, Graph};
//! use musegraph::node::{Node, NodePayload};
//!
//! let prompt = Node::with_id("p", NodePayload::prompt("A cat"));
//! let gen_node = Node::with_id("g", NodePayload::generate());
//!
//! let g = Graph::default().with_node(prompt).with_node(gen_node);
//! let g = g.with_edge(Edge::new("p", "text", "g", "text"));
//! assert_eq!(g.edges_in("g", Some("text")).count(), 1);
//!
//! // Removing a node cascades its edges.
//! let g2 = g.without_node("p");
//! assert_eq!(g2.edge_count(), 0);
//! assert_eq!(g.edge_count(), 1); // prior snapshot untouched
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use super::edge::Edge;
use crate::node::Node;
use crate::types::NodeId;
use crate::utils::json_ext::shallow_merge;

/// Errors from graph mutation primitives.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// The referenced node does not exist in this snapshot.
    #[error("unknown node: {id}")]
    #[diagnostic(code(musegraph::graph::unknown_node))]
    UnknownNode { id: NodeId },

    /// A payload patch produced data the node's variant cannot hold.
    #[error("patch for node {id} does not fit its payload: {source}")]
    #[diagnostic(
        code(musegraph::graph::bad_patch),
        help("Patches shallow-merge into the payload object; keys must match the variant's fields.")
    )]
    BadPatch {
        id: NodeId,
        #[source]
        source: serde_json::Error,
    },

    /// A payload patch was not a JSON object.
    #[error("patch for node {id} must be a JSON object")]
    #[diagnostic(code(musegraph::graph::non_object_patch))]
    NonObjectPatch { id: NodeId },

    /// A patch named a key the node's payload variant has no field for.
    #[error("patch for node {id} names `{key}`, which its payload has no field for")]
    #[diagnostic(
        code(musegraph::graph::unknown_patch_key),
        help("Patch keys must name existing fields of the payload variant.")
    )]
    UnknownPatchKey { id: NodeId, key: String },
}

/// An immutable node/edge snapshot.
///
/// Node lookup is by id; edges live in a `Vec` because their insertion order
/// is semantically meaningful (capacity eviction, aggregate resolution).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: FxHashMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns `true` when the node exists in this snapshot.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All nodes, in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges, in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges terminating on `node`, optionally restricted to one input port,
    /// in insertion order.
    pub fn edges_in<'a>(
        &'a self,
        node: &'a str,
        port: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.target == node && port.is_none_or(|p| e.target_port == p))
    }

    /// Edges originating from `node`, optionally restricted to one output
    /// port, in insertion order.
    pub fn edges_out<'a>(
        &'a self,
        node: &'a str,
        port: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.source == node && port.is_none_or(|p| e.source_port == p))
    }

    /// Insert (or replace) a node.
    #[must_use]
    pub fn with_node(&self, node: Node) -> Self {
        let mut next = self.clone();
        next.nodes.insert(node.id.clone(), node);
        next
    }

    /// Remove a node and every edge touching it. Removing an unknown id is
    /// a no-op snapshot copy.
    #[must_use]
    pub fn without_node(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.nodes.remove(id);
        next.edges.retain(|e| !e.touches(id));
        next
    }

    /// Append an edge. Legality and capacity are the caller's concern; use
    /// [`connect`](crate::graph::connect) for the gated path.
    #[must_use]
    pub fn with_edge(&self, edge: Edge) -> Self {
        let mut next = self.clone();
        next.edges.push(edge);
        next
    }

    /// Remove an edge by id. Unknown ids are a no-op snapshot copy.
    #[must_use]
    pub fn without_edge(&self, edge_id: &str) -> Self {
        let mut next = self.clone();
        next.edges.retain(|e| e.id != edge_id);
        next
    }

    /// Apply a closure to one node, producing a new snapshot.
    ///
    /// This is the reducer used by the orchestrator for status/result
    /// writes. A missing id returns `None` (the mid-run-deletion no-op).
    #[must_use]
    pub fn update_node(&self, id: &str, f: impl FnOnce(&mut Node)) -> Option<Self> {
        let mut next = self.clone();
        let node = next.nodes.get_mut(id)?;
        f(node);
        Some(next)
    }

    /// Shallow-merge a JSON partial into a node's payload.
    ///
    /// The partial's keys overwrite the corresponding payload fields; keys
    /// absent from the partial are untouched. The payload's variant tag is
    /// preserved unless the partial overrides `"type"`. Keys the variant has
    /// no field for are rejected up front; tagged deserialization would
    /// otherwise drop them silently.
    pub fn patch_node_data(&self, id: &str, partial: &Value) -> Result<Self, GraphError> {
        let node = self.node(id).ok_or_else(|| GraphError::UnknownNode {
            id: id.to_string(),
        })?;
        if !partial.is_object() {
            return Err(GraphError::NonObjectPatch { id: id.to_string() });
        }

        let current = serde_json::to_value(&node.payload).map_err(|source| {
            GraphError::BadPatch {
                id: id.to_string(),
                source,
            }
        })?;
        // The payload serializes with its tag inline, so every legal key
        // (including "type") appears on the current object.
        if let (Some(fields), Some(patch)) = (current.as_object(), partial.as_object()) {
            for key in patch.keys() {
                if !fields.contains_key(key) {
                    return Err(GraphError::UnknownPatchKey {
                        id: id.to_string(),
                        key: key.clone(),
                    });
                }
            }
        }
        let merged = shallow_merge(&current, partial);
        let payload = serde_json::from_value(merged).map_err(|source| GraphError::BadPatch {
            id: id.to_string(),
            source,
        })?;

        let mut next = self.clone();
        if let Some(node) = next.nodes.get_mut(id) {
            node.payload = payload;
        }
        Ok(next)
    }
}

/// Shared handle over the current graph snapshot.
///
/// Cloning the store is cheap and shares the same underlying graph. All
/// writers funnel through [`commit`](Self::commit), which replaces the
/// `Arc<Graph>` wholesale.
#[derive(Clone, Default)]
pub struct GraphStore {
    current: Arc<RwLock<Arc<Graph>>>,
}

impl GraphStore {
    /// Wrap an initial graph.
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(graph))),
        }
    }

    /// The current snapshot. Holding the returned `Arc` keeps that view
    /// alive regardless of later commits.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Graph> {
        self.current.read().expect("graph store poisoned").clone()
    }

    /// Replace the current snapshot with the result of `f`.
    ///
    /// The closure runs under the write lock, so concurrent commits are
    /// serialized and never lose updates.
    pub fn commit(&self, f: impl FnOnce(&Graph) -> Graph) {
        let mut guard = self.current.write().expect("graph store poisoned");
        let next = f(guard.as_ref());
        *guard = Arc::new(next);
    }

    /// Apply a node update through the store; returns `false` when the node
    /// no longer exists (deleted mid-run), in which case nothing changes.
    pub fn update_node(&self, id: &str, f: impl FnOnce(&mut Node)) -> bool {
        let mut guard = self.current.write().expect("graph store poisoned");
        match guard.update_node(id, f) {
            Some(next) => {
                *guard = Arc::new(next);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodePayload;

    fn two_node_graph() -> Graph {
        Graph::default()
            .with_node(Node::with_id("a", NodePayload::prompt("hello")))
            .with_node(Node::with_id("b", NodePayload::generate()))
            .with_edge(Edge::new("a", "text", "b", "text"))
    }

    #[test]
    fn snapshots_are_independent() {
        let g1 = two_node_graph();
        let g2 = g1.without_node("a");
        assert_eq!(g1.node_count(), 2);
        assert_eq!(g1.edge_count(), 1);
        assert_eq!(g2.node_count(), 1);
        assert_eq!(g2.edge_count(), 0);
    }

    #[test]
    fn patch_shallow_merges_payload() {
        let g = two_node_graph();
        let g = g
            .patch_node_data("a", &serde_json::json!({ "text": "rewritten" }))
            .unwrap();
        match &g.node("a").unwrap().payload {
            NodePayload::Prompt { text } => assert_eq!(text, "rewritten"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn patch_rejects_unknown_node_and_bad_shape() {
        let g = two_node_graph();
        assert!(matches!(
            g.patch_node_data("missing", &serde_json::json!({})),
            Err(GraphError::UnknownNode { .. })
        ));
        assert!(matches!(
            g.patch_node_data("a", &serde_json::json!(42)),
            Err(GraphError::NonObjectPatch { .. })
        ));
        // `text` must be a string for a Prompt payload.
        assert!(matches!(
            g.patch_node_data("a", &serde_json::json!({ "text": 7 })),
            Err(GraphError::BadPatch { .. })
        ));
        // A Prompt payload has no `arity` field to merge into.
        assert!(matches!(
            g.patch_node_data("a", &serde_json::json!({ "arity": 3 })),
            Err(GraphError::UnknownPatchKey { .. })
        ));
    }

    #[test]
    fn store_update_is_noop_for_deleted_node() {
        let store = GraphStore::new(two_node_graph());
        store.commit(|g| g.without_node("b"));
        assert!(!store.update_node("b", |n| n.error = Some("late write".into())));
        assert!(store.snapshot().node("b").is_none());
    }
}

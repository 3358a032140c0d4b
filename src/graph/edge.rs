//! Directed, port-addressed edges.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{NodeId, PortId};

/// A directed connection from a source output port to a target input port.
///
/// Edges are value objects; ordering matters and is preserved by the graph's
/// edge list (capacity policies and aggregate resolution both depend on
/// insertion order).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub source_port: PortId,
    pub target: NodeId,
    pub target_port: PortId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Create an edge with a fresh v4 id.
    #[must_use]
    pub fn new(
        source: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        target: impl Into<NodeId>,
        target_port: impl Into<PortId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            source_port: source_port.into(),
            target: target.into(),
            target_port: target_port.into(),
            label: None,
        }
    }

    /// Attach a display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns `true` when the edge touches `node` on either end.
    #[must_use]
    pub fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }
}

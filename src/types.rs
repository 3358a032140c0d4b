//! Core types for the musegraph execution engine.
//!
//! This module defines the fundamental vocabulary shared by the graph store,
//! the connection validator, the input resolver, and the orchestrator:
//! port kinds and directions, node run status, and canvas positions.
//!
//! Ports on a node are distinguished by string ids. Multi-output nodes expose
//! indexed ids (`"image-0"`, `"image-1"`, ...); [`slot_index`] extracts the
//! numeric suffix that the resolver uses to pick a slot.
//!
//! # Examples
//!
//! ```rust
//! use musegraph::types::{PortKind, slot_index};
//!
//! assert_eq!(slot_index("image-2"), Some(2));
//! assert_eq!(slot_index("text"), None);
//! assert_eq!(PortKind::Image.to_string(), "image");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node within a graph.
pub type NodeId = String;

/// Identifier for a port on a node. Ports on the same node are distinguished
/// by id; multi-output nodes use indexed ids such as `"image-3"`.
pub type PortId = String;

/// Semantic kind of the value a port carries.
///
/// Connection legality requires the source output and target input to be
/// compatible kinds; the full rules live in
/// [`graph::validate`](crate::graph::validate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Plain text: prompts, notes, analysis output segments.
    Text,
    /// Still raster media: stored images, crops, grid composites, batch slots.
    Image,
    /// Video media produced by async provider nodes.
    Video,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Direction of a port relative to its node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Incoming edges terminate here.
    In,
    /// Outgoing edges originate here.
    Out,
}

/// Run status of a node.
///
/// The orchestrator drives the machine
/// `Idle|Succeeded|Failed → Running → {Succeeded, Failed}`. A node never
/// transitions out of `Running` except through the orchestrator that put it
/// there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Never run, or reset.
    #[default]
    Idle,
    /// A run is in flight.
    Running,
    /// The last run produced at least one result.
    Succeeded,
    /// The last run produced nothing; the node carries an error message.
    Failed,
}

impl NodeStatus {
    /// Returns `true` when a new run may be started from this status.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns `true` for `Succeeded` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Position of a node on the (excluded) canvas. Carried through the data
/// model so persistence snapshots round-trip, never interpreted by the
/// engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Extract the numeric slot suffix from an indexed port id.
///
/// Indexed ports follow the `"{base}-{index}"` convention. Returns `None`
/// for un-indexed ids.
///
/// ```rust
/// use musegraph::types::slot_index;
///
/// assert_eq!(slot_index("image-0"), Some(0));
/// assert_eq!(slot_index("video-12"), Some(12));
/// assert_eq!(slot_index("image"), None);
/// assert_eq!(slot_index("image-"), None);
/// ```
#[must_use]
pub fn slot_index(port_id: &str) -> Option<usize> {
    let (_, suffix) = port_id.rsplit_once('-')?;
    suffix.parse().ok()
}

//! Node data model: the closed set of node variants and their payloads.
//!
//! Every node on the canvas is a [`Node`]: an id, a position, a run
//! [`NodeStatus`](crate::types::NodeStatus), an optional error message, and a
//! type-specific [`NodePayload`]. The payload union is deliberately closed;
//! the resolver and orchestrator match it exhaustively, so adding a variant
//! is a compile-time checklist of every place that must handle it rather
//! than a runtime branch miss.
//!
//! # Examples
//!
//! ```rust
//! use musegraph::node::{Node, NodePayload, NodeType};
//!
//! let prompt = Node::new(NodePayload::prompt("A cat wearing a tiny hat"));
//! assert_eq!(prompt.payload.node_type(), NodeType::Prompt);
//! assert!(prompt.payload.produces_text());
//! assert!(!prompt.payload.produces_image());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::media::{CropRect, MediaRef};
use crate::types::{NodeId, NodeStatus, Position};

/// Fieldless tag identifying a node variant. Used as the key of the
/// connection compatibility table and in log/event output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Prompt,
    Note,
    Image,
    ImageSplit,
    ImageGrid,
    Generate,
    MultiGenerate,
    ReferenceGenerate,
    Analysis,
    VideoProvider,
    VideoCompose,
    PromptAggregate,
    FrameExtract,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Prompt => "prompt",
            Self::Note => "note",
            Self::Image => "image",
            Self::ImageSplit => "imageSplit",
            Self::ImageGrid => "imageGrid",
            Self::Generate => "generate",
            Self::MultiGenerate => "multiGenerate",
            Self::ReferenceGenerate => "referenceGenerate",
            Self::Analysis => "analysis",
            Self::VideoProvider => "videoProvider",
            Self::VideoCompose => "videoCompose",
            Self::PromptAggregate => "promptAggregate",
            Self::FrameExtract => "frameExtract",
        };
        write!(f, "{s}")
    }
}

/// External video generation provider behind a [`NodePayload::VideoProvider`].
///
/// Providers differ in how many reference images their image port accepts
/// and in when a text-free submission is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProviderKind {
    Vidu,
    Kling,
}

impl VideoProviderKind {
    /// Fan-in cap of the provider's reference-image port.
    #[must_use]
    pub fn image_capacity(&self) -> usize {
        match self {
            Self::Vidu => 7,
            Self::Kling => 4,
        }
    }

    /// Minimum number of resolved reference images that makes an empty
    /// prompt acceptable at submission time.
    #[must_use]
    pub fn min_images_for_textless(&self) -> usize {
        match self {
            Self::Vidu => 1,
            Self::Kling => 2,
        }
    }
}

impl fmt::Display for VideoProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vidu => write!(f, "vidu"),
            Self::Kling => write!(f, "kling"),
        }
    }
}

/// Type-specific node data. One variant per [`NodeType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodePayload {
    /// A user-authored text prompt.
    Prompt { text: String },

    /// Free-form annotation; also usable as a text source.
    Note { text: String },

    /// A stored still image.
    Image { source: Option<MediaRef> },

    /// Derive-by-crop node. The base image is either the single upstream
    /// image edge (resolved recursively, crop-of-crop included) or, absent
    /// an edge, the node's own `source`. The rectangle is declared against
    /// `declared_width × declared_height`.
    ImageSplit {
        source: Option<MediaRef>,
        rect: CropRect,
        declared_width: u32,
        declared_height: u32,
    },

    /// Composite node exposing a single pre-composited output built from
    /// its cells by the (excluded) renderer.
    ImageGrid {
        cells: Vec<Option<MediaRef>>,
        composited: Option<MediaRef>,
    },

    /// Single-output generation node.
    Generate { result: Option<MediaRef> },

    /// Fixed-arity batch generation node. `slots[i]` is the result of call
    /// `i`; `slot_errors[i]` retains that call's failure if any.
    /// `consolidated` is a fallback reference used when an indexed slot is
    /// empty (e.g. after template instantiation of a finished batch).
    MultiGenerate {
        arity: usize,
        slots: Vec<Option<MediaRef>>,
        slot_errors: Vec<Option<String>>,
        consolidated: Option<MediaRef>,
    },

    /// Generation node with two dedicated reference-image ports.
    ReferenceGenerate { result: Option<MediaRef> },

    /// Image analysis node producing named text segments that downstream
    /// nodes index into.
    Analysis { segments: Vec<String> },

    /// Async video generation through an external provider.
    VideoProvider {
        provider: VideoProviderKind,
        result: Option<MediaRef>,
        job_id: Option<String>,
    },

    /// Sequencing node with fixed video tracks and a composed output.
    VideoCompose {
        tracks: Vec<Option<MediaRef>>,
        output: Option<MediaRef>,
    },

    /// Joins many upstream prompts into one text output, in edge order.
    PromptAggregate { separator: String },

    /// Holds rasters extracted from an upstream video; its image output is
    /// the frame at `selected`.
    FrameExtract {
        frames: Vec<MediaRef>,
        selected: usize,
    },
}

impl NodePayload {
    /// Default payload for a prompt node.
    #[must_use]
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt { text: text.into() }
    }

    /// Default payload for a note node.
    #[must_use]
    pub fn note(text: impl Into<String>) -> Self {
        Self::Note { text: text.into() }
    }

    /// Default payload for a stored-image node.
    #[must_use]
    pub fn image(source: Option<MediaRef>) -> Self {
        Self::Image { source }
    }

    /// Default payload for a crop node over the given declared space.
    #[must_use]
    pub fn image_split(rect: CropRect, declared_width: u32, declared_height: u32) -> Self {
        Self::ImageSplit {
            source: None,
            rect,
            declared_width,
            declared_height,
        }
    }

    /// Default payload for a single-output generation node.
    #[must_use]
    pub fn generate() -> Self {
        Self::Generate { result: None }
    }

    /// Default payload for a batch node of `arity` slots.
    #[must_use]
    pub fn multi_generate(arity: usize) -> Self {
        Self::MultiGenerate {
            arity,
            slots: vec![None; arity],
            slot_errors: vec![None; arity],
            consolidated: None,
        }
    }

    /// Default payload for a reference-image generation node.
    #[must_use]
    pub fn reference_generate() -> Self {
        Self::ReferenceGenerate { result: None }
    }

    /// Default payload for an analysis node.
    #[must_use]
    pub fn analysis() -> Self {
        Self::Analysis {
            segments: Vec::new(),
        }
    }

    /// Default payload for a provider-backed video node.
    #[must_use]
    pub fn video_provider(provider: VideoProviderKind) -> Self {
        Self::VideoProvider {
            provider,
            result: None,
            job_id: None,
        }
    }

    /// Default payload for a three-track video composition node.
    #[must_use]
    pub fn video_compose() -> Self {
        Self::VideoCompose {
            tracks: vec![None; 3],
            output: None,
        }
    }

    /// Default payload for a prompt aggregation node.
    #[must_use]
    pub fn prompt_aggregate() -> Self {
        Self::PromptAggregate {
            separator: "\n".to_string(),
        }
    }

    /// Default payload for a frame extraction node.
    #[must_use]
    pub fn frame_extract() -> Self {
        Self::FrameExtract {
            frames: Vec::new(),
            selected: 0,
        }
    }

    /// The fieldless tag for this payload.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Prompt { .. } => NodeType::Prompt,
            Self::Note { .. } => NodeType::Note,
            Self::Image { .. } => NodeType::Image,
            Self::ImageSplit { .. } => NodeType::ImageSplit,
            Self::ImageGrid { .. } => NodeType::ImageGrid,
            Self::Generate { .. } => NodeType::Generate,
            Self::MultiGenerate { .. } => NodeType::MultiGenerate,
            Self::ReferenceGenerate { .. } => NodeType::ReferenceGenerate,
            Self::Analysis { .. } => NodeType::Analysis,
            Self::VideoProvider { .. } => NodeType::VideoProvider,
            Self::VideoCompose { .. } => NodeType::VideoCompose,
            Self::PromptAggregate { .. } => NodeType::PromptAggregate,
            Self::FrameExtract { .. } => NodeType::FrameExtract,
        }
    }

    /// Does this node expose a text output?
    #[must_use]
    pub fn produces_text(&self) -> bool {
        matches!(
            self,
            Self::Prompt { .. }
                | Self::Note { .. }
                | Self::Analysis { .. }
                | Self::PromptAggregate { .. }
        )
    }

    /// Does this node expose an image output?
    #[must_use]
    pub fn produces_image(&self) -> bool {
        matches!(
            self,
            Self::Image { .. }
                | Self::ImageSplit { .. }
                | Self::ImageGrid { .. }
                | Self::Generate { .. }
                | Self::MultiGenerate { .. }
                | Self::ReferenceGenerate { .. }
                | Self::FrameExtract { .. }
        )
    }

    /// Does this node expose a video output?
    #[must_use]
    pub fn produces_video(&self) -> bool {
        matches!(self, Self::VideoProvider { .. } | Self::VideoCompose { .. })
    }
}

/// A typed unit in the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    #[serde(default)]
    pub status: NodeStatus,
    /// Human-readable message set when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub payload: NodePayload,
}

impl Node {
    /// Create a node with a fresh v4 id at the origin.
    #[must_use]
    pub fn new(payload: NodePayload) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    /// Create a node with a caller-chosen id (paste, duplicate, template
    /// instantiation and tests all need deterministic ids).
    #[must_use]
    pub fn with_id(id: impl Into<NodeId>, payload: NodePayload) -> Self {
        Self {
            id: id.into(),
            position: Position::default(),
            status: NodeStatus::Idle,
            error: None,
            payload,
        }
    }

    /// Place the node on the canvas.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Shorthand for `self.payload.node_type()`.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.payload.node_type()
    }
}

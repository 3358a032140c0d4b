//! Input resolution: computing a node's effective inputs by walking the
//! graph.
//!
//! Resolution is strictly read-only. Text resolution is synchronous and
//! pure; image resolution is async because derived nodes (crops) must fetch
//! and decode their base reference. Both thread an explicit `visited` set so
//! cyclic derive chains terminate with "no value" instead of recursing
//! forever.
//!
//! The traversal rules, in source-payload order:
//!
//! - **multi-output batch**: the slot matching the source port's numeric
//!   suffix, falling back to the consolidated reference
//! - **crop**: base image (upstream edge if present, else own stored
//!   bytes), rescaled rectangle, rendered under the pixel budget (see
//!   [`crop`])
//! - **frame extraction**: the raster at the currently selected index
//! - **grid composite**: the pre-composited output
//! - anything else: the node's stored reference / text field

pub mod crop;

use futures_util::future::BoxFuture;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::backends::{AssetFetcher, FetchError};
use crate::graph::{Edge, Graph};
use crate::media::MediaRef;
use crate::node::{Node, NodePayload};
use crate::types::{NodeId, slot_index};

pub use crop::{CropError, MAX_OUTPUT_PIXELS};

/// Errors from recursive image resolution.
///
/// A derive chain that fails to fetch or decode aborts resolution; the
/// orchestrator turns that into a failed run without any external call.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Crop(#[from] CropError),
}

/// Resolve the effective prompt text for `node_id`.
///
/// Follows the single edge on the node's `text` port and extracts the
/// canonical text from the source by payload rule. The result is trimmed;
/// whitespace-only text resolves to `None`.
#[must_use]
pub fn resolve_text(graph: &Graph, node_id: &str) -> Option<String> {
    let edge = graph.edges_in(node_id, Some("text")).next()?;
    let mut visited = FxHashSet::default();
    source_text(graph, edge, &mut visited)
}

/// Resolve every simultaneous text input on `node_id`, in edge insertion
/// order, dropping entries that resolve empty.
#[must_use]
pub fn resolve_text_aggregate(graph: &Graph, node_id: &str) -> Vec<String> {
    graph
        .edges_in(node_id, Some("text"))
        .filter_map(|edge| {
            let mut visited = FxHashSet::default();
            source_text(graph, edge, &mut visited)
        })
        .collect()
}

/// Extract the canonical text carried by `edge` from its source node.
///
/// Segment sources (analysis nodes) are indexed by the numeric suffix of
/// the edge's source port, falling back to the target port's suffix.
/// Aggregate sources recurse over their own incoming text edges.
fn source_text(graph: &Graph, edge: &Edge, visited: &mut FxHashSet<NodeId>) -> Option<String> {
    if !visited.insert(edge.source.clone()) {
        return None;
    }
    let node = graph.node(&edge.source)?;
    let raw = match &node.payload {
        NodePayload::Prompt { text } | NodePayload::Note { text } => text.clone(),
        NodePayload::Analysis { segments } => {
            let idx = slot_index(&edge.source_port).or_else(|| slot_index(&edge.target_port))?;
            segments.get(idx)?.clone()
        }
        NodePayload::PromptAggregate { separator } => {
            let parts: Vec<String> = graph
                .edges_in(&node.id, Some("text"))
                .filter_map(|e| source_text(graph, e, visited))
                .collect();
            if parts.is_empty() {
                return None;
            }
            parts.join(separator)
        }
        _ => return None,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve the image value exposed by `node` through `source_port`.
///
/// Returns `Ok(None)` when the node has no value on that output, including
/// the cycle-guard case where `node.id` is already in `visited`.
pub fn resolve_image<'a>(
    graph: &'a Graph,
    node: &'a Node,
    source_port: &'a str,
    visited: &'a mut FxHashSet<NodeId>,
    fetcher: &'a dyn AssetFetcher,
) -> BoxFuture<'a, Result<Option<MediaRef>, ResolveError>> {
    Box::pin(async move {
        if !visited.insert(node.id.clone()) {
            return Ok(None);
        }
        match &node.payload {
            NodePayload::MultiGenerate {
                slots,
                consolidated,
                ..
            } => match slot_index(source_port) {
                Some(i) => Ok(slots
                    .get(i)
                    .cloned()
                    .flatten()
                    .or_else(|| consolidated.clone())),
                None => Ok(consolidated.clone()),
            },
            NodePayload::ImageSplit {
                source,
                rect,
                declared_width,
                declared_height,
            } => {
                // Upstream edge wins over the node's own stored bytes, and
                // recurses through crop-of-crop chains first.
                let upstream = match graph.edges_in(&node.id, Some("img")).next() {
                    Some(edge) => match graph.node(&edge.source) {
                        Some(up) => {
                            resolve_image(graph, up, &edge.source_port, visited, fetcher).await?
                        }
                        None => None,
                    },
                    None => None,
                };
                let Some(base) = upstream.or_else(|| source.clone()) else {
                    return Ok(None);
                };

                let bytes = fetcher.fetch(&base).await?;
                let rendered =
                    crop::render_crop(&bytes, *rect, (*declared_width, *declared_height))?;
                Ok(Some(MediaRef::from_bytes("image/png", &rendered)))
            }
            NodePayload::FrameExtract { frames, selected } => {
                Ok(frames.get(*selected).cloned())
            }
            NodePayload::ImageGrid { composited, .. } => Ok(composited.clone()),
            NodePayload::Image { source } => Ok(source.clone()),
            NodePayload::Generate { result } | NodePayload::ReferenceGenerate { result } => {
                Ok(result.clone())
            }
            NodePayload::Prompt { .. }
            | NodePayload::Note { .. }
            | NodePayload::Analysis { .. }
            | NodePayload::PromptAggregate { .. }
            | NodePayload::VideoProvider { .. }
            | NodePayload::VideoCompose { .. } => Ok(None),
        }
    })
}

/// Resolve every image arriving on one of `node_id`'s input ports, in edge
/// insertion order. Sources that resolve to no value are skipped; a source
/// that *fails* to resolve aborts the whole resolution.
pub async fn resolve_images_in(
    graph: &Graph,
    node_id: &str,
    port: &str,
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<MediaRef>, ResolveError> {
    let mut out = Vec::new();
    for edge in graph.edges_in(node_id, Some(port)) {
        let Some(source) = graph.node(&edge.source) else {
            continue;
        };
        let mut visited = FxHashSet::default();
        if let Some(media) =
            resolve_image(graph, source, &edge.source_port, &mut visited, fetcher).await?
        {
            out.push(media);
        }
    }
    Ok(out)
}

/// Resolve the single image on `port`, if any.
pub async fn resolve_image_in(
    graph: &Graph,
    node_id: &str,
    port: &str,
    fetcher: &dyn AssetFetcher,
) -> Result<Option<MediaRef>, ResolveError> {
    Ok(resolve_images_in(graph, node_id, port, fetcher)
        .await?
        .into_iter()
        .next())
}

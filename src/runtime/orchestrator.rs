//! Run orchestration: the state machine that takes a node from `Idle`
//! through `Running` to a terminal status.
//!
//! The orchestrator never talks to a provider directly; every external call
//! goes through the trait objects in [`Backends`]. A run is:
//!
//! 1. guard (node exists, is runnable, is not already running)
//! 2. resolve inputs from the current snapshot (read-only)
//! 3. dispatch to the backend by input cardinality
//! 4. write results back through the store and notify the event bus
//!
//! Failures at any stage are written onto the node as `Failed` plus the
//! error message verbatim, and also returned to the caller. A node deleted
//! mid-run makes every pending write a no-op.

use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::backends::{
    AssetFetcher, AssetStager, BackendError, FetchError, GenerationBackend, HistoryEntry,
    HistoryService, VideoJobBackend,
};
use crate::event_bus::{Event, EventBus, JobPhase};
use crate::graph::{Graph, GraphStore};
use crate::media::MediaRef;
use crate::node::{Node, NodePayload, NodeType, VideoProviderKind};
use crate::resolver::{ResolveError, resolve_images_in, resolve_text};
use crate::runtime::{BatchMode, RuntimeConfig, TaskPoller};
use crate::types::{NodeId, NodeStatus, slot_index};

/// Why a run ended without a result.
///
/// Guard failures (`UnknownNode`, `AlreadyRunning`, `NotRunnable`) are
/// returned before the node's status changes; everything else is also
/// written onto the node as a `Failed` status.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("unknown node: {id}")]
    #[diagnostic(code(musegraph::run::unknown_node))]
    UnknownNode { id: NodeId },

    #[error("node {id} is already running")]
    #[diagnostic(code(musegraph::run::already_running))]
    AlreadyRunning { id: NodeId },

    #[error("{node_type} nodes cannot be run")]
    #[diagnostic(
        code(musegraph::run::not_runnable),
        help("Only generation, batch, reference, and video provider nodes execute.")
    )]
    NotRunnable { id: NodeId, node_type: NodeType },

    /// A required input resolved to nothing; no external call was made.
    #[error("missing required input: {what}")]
    #[diagnostic(code(musegraph::run::missing_input))]
    MissingInput { what: String },

    /// A reference cannot be turned into something the provider accepts.
    #[error("reference cannot be staged for submission: {handle}")]
    #[diagnostic(
        code(musegraph::run::unstageable),
        help("Ephemeral handles have no fetchable bytes; re-import the asset.")
    )]
    Unstageable { handle: String },

    /// Every slot of a batch run failed.
    #[error("all {arity} batch calls failed")]
    #[diagnostic(
        code(musegraph::run::batch_exhausted),
        help("Per-slot messages are retained on the node's slot errors.")
    )]
    AllSlotsFailed { arity: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Poll(#[from] crate::runtime::PollError),
}

/// The external collaborators a run can touch, as shared trait objects.
#[derive(Clone)]
pub struct Backends {
    pub generation: Arc<dyn GenerationBackend>,
    pub video: Arc<dyn VideoJobBackend>,
    pub stager: Arc<dyn AssetStager>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub history: Arc<dyn HistoryService>,
}

/// Drives node runs against a shared [`GraphStore`].
///
/// Cloning is cheap; clones share the store and backends, so one
/// orchestrator per canvas serves any number of concurrent runs.
#[derive(Clone)]
pub struct Orchestrator {
    store: GraphStore,
    backends: Backends,
    events: flume::Sender<Event>,
    config: RuntimeConfig,
}

/// Dispatch plan extracted from the payload before the run starts.
enum Plan {
    Single,
    Reference,
    Batch { arity: usize },
    Video { provider: VideoProviderKind },
}

impl Orchestrator {
    /// Build an orchestrator. Events go nowhere until a sender is attached
    /// with [`with_event_sender`](Self::with_event_sender) or
    /// [`with_bus`](Self::with_bus).
    #[must_use]
    pub fn new(store: GraphStore, backends: Backends, config: RuntimeConfig) -> Self {
        let (detached, _) = flume::unbounded();
        Self {
            store,
            backends,
            events: detached,
            config,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: flume::Sender<Event>) -> Self {
        self.events = sender;
        self
    }

    #[must_use]
    pub fn with_bus(self, bus: &EventBus) -> Self {
        self.with_event_sender(bus.get_sender())
    }

    /// The shared store this orchestrator writes through.
    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Cheap readiness check for run affordances.
    ///
    /// Conservative on purpose: it counts connections instead of resolving
    /// images, so it never fetches.
    #[must_use]
    pub fn can_run(&self, id: &str) -> bool {
        let graph = self.store.snapshot();
        let Some(node) = graph.node(id) else {
            return false;
        };
        if !node.status.can_start() {
            return false;
        }
        match &node.payload {
            NodePayload::Generate { .. }
            | NodePayload::MultiGenerate { .. }
            | NodePayload::ReferenceGenerate { .. } => resolve_text(&graph, id).is_some(),
            NodePayload::VideoProvider { provider, .. } => {
                resolve_text(&graph, id).is_some()
                    || graph.edges_in(id, Some("image")).count()
                        >= provider.min_images_for_textless()
            }
            _ => false,
        }
    }

    /// Run one node to a terminal status.
    ///
    /// Guard failures return before any status write. Otherwise the node
    /// goes `Running`, inputs are resolved against the snapshot taken at
    /// entry, and the outcome is written back as `Succeeded` or `Failed`
    /// (with the error message verbatim).
    #[instrument(skip(self), fields(node = id))]
    pub async fn run_node(&self, id: &str) -> Result<(), RunError> {
        let snapshot = self.store.snapshot();
        let node = snapshot.node(id).ok_or_else(|| RunError::UnknownNode {
            id: id.to_string(),
        })?;
        if !node.status.can_start() {
            return Err(RunError::AlreadyRunning {
                id: id.to_string(),
            });
        }
        let plan = match &node.payload {
            NodePayload::Generate { .. } => Plan::Single,
            NodePayload::ReferenceGenerate { .. } => Plan::Reference,
            NodePayload::MultiGenerate { arity, .. } => Plan::Batch { arity: *arity },
            NodePayload::VideoProvider { provider, .. } => Plan::Video {
                provider: *provider,
            },
            other => {
                return Err(RunError::NotRunnable {
                    id: id.to_string(),
                    node_type: other.node_type(),
                });
            }
        };

        self.set_status(id, NodeStatus::Running, None);
        let outcome = match plan {
            Plan::Single => self.run_single(&snapshot, node).await,
            Plan::Reference => self.run_reference(&snapshot, node).await,
            Plan::Batch { arity } => self.run_batch(&snapshot, node, arity).await,
            Plan::Video { provider } => self.run_video(&snapshot, node, provider).await,
        };
        match outcome {
            Ok(()) => {
                self.set_status(id, NodeStatus::Succeeded, None);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(node = id, error = %e, "run failed");
                self.set_status(id, NodeStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_single(&self, graph: &Graph, node: &Node) -> Result<(), RunError> {
        let prompt = resolve_text(graph, &node.id).ok_or_else(|| RunError::MissingInput {
            what: "prompt".to_string(),
        })?;
        let images =
            resolve_images_in(graph, &node.id, "image", self.backends.fetcher.as_ref()).await?;
        let (result, operation) = self.dispatch(&prompt, &images).await?;

        self.store.update_node(&node.id, |n| {
            if let NodePayload::Generate { result: r }
            | NodePayload::ReferenceGenerate { result: r } = &mut n.payload
            {
                *r = Some(result.clone());
            }
        });
        let _ = self.events.send(Event::result_ready(&node.id, "image"));
        self.propagate(&node.id, "image", &result);
        self.record_history(&node.id, operation, &prompt, &images, &result)
            .await;
        Ok(())
    }

    async fn run_reference(&self, graph: &Graph, node: &Node) -> Result<(), RunError> {
        let prompt = resolve_text(graph, &node.id).ok_or_else(|| RunError::MissingInput {
            what: "prompt".to_string(),
        })?;
        let mut images = Vec::with_capacity(2);
        for port in ["image-1", "image-2"] {
            images.extend(
                resolve_images_in(graph, &node.id, port, self.backends.fetcher.as_ref()).await?,
            );
        }
        let (result, operation) = self.dispatch(&prompt, &images).await?;

        self.store.update_node(&node.id, |n| {
            if let NodePayload::ReferenceGenerate { result: r } = &mut n.payload {
                *r = Some(result.clone());
            }
        });
        let _ = self.events.send(Event::result_ready(&node.id, "image"));
        self.propagate(&node.id, "image", &result);
        self.record_history(&node.id, operation, &prompt, &images, &result)
            .await;
        Ok(())
    }

    /// Batch run: `arity` backend calls sharing one resolved input set.
    ///
    /// Each slot settles independently (result or retained per-slot error).
    /// The run as a whole fails only when every slot does.
    async fn run_batch(&self, graph: &Graph, node: &Node, arity: usize) -> Result<(), RunError> {
        let prompt = resolve_text(graph, &node.id).ok_or_else(|| RunError::MissingInput {
            what: "prompt".to_string(),
        })?;
        let images =
            resolve_images_in(graph, &node.id, "image", self.backends.fetcher.as_ref()).await?;

        let succeeded = match self.config.batch_mode {
            BatchMode::Sequential => {
                let mut count = 0usize;
                for slot in 0..arity {
                    if self.run_slot(&node.id, slot, &prompt, &images).await {
                        count += 1;
                    }
                }
                count
            }
            BatchMode::Concurrent => {
                let settles = (0..arity).map(|slot| self.run_slot(&node.id, slot, &prompt, &images));
                join_all(settles).await.into_iter().filter(|ok| *ok).count()
            }
        };

        if succeeded == 0 {
            Err(RunError::AllSlotsFailed { arity })
        } else {
            Ok(())
        }
    }

    /// One slot call: dispatch, then write the result or the error into the
    /// matching payload index. Returns whether the slot succeeded.
    async fn run_slot(&self, id: &str, slot: usize, prompt: &str, images: &[MediaRef]) -> bool {
        match self.dispatch(prompt, images).await {
            Ok((result, operation)) => {
                self.store.update_node(id, |n| {
                    if let NodePayload::MultiGenerate {
                        slots, slot_errors, ..
                    } = &mut n.payload
                        && slot < slots.len()
                    {
                        slots[slot] = Some(result.clone());
                        slot_errors[slot] = None;
                    }
                });
                let port = format!("image-{slot}");
                let _ = self.events.send(Event::slot_settled(id, slot, None));
                let _ = self.events.send(Event::result_ready(id, port.clone()));
                self.propagate(id, &port, &result);
                self.record_history(id, operation, prompt, images, &result)
                    .await;
                true
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(node = id, slot, error = %message, "batch slot failed");
                self.store.update_node(id, |n| {
                    if let NodePayload::MultiGenerate { slot_errors, .. } = &mut n.payload
                        && slot < slot_errors.len()
                    {
                        slot_errors[slot] = Some(message.clone());
                    }
                });
                let _ = self.events.send(Event::slot_settled(id, slot, Some(message)));
                false
            }
        }
    }

    /// Video provider run: validate, stage, submit, then poll to terminal.
    async fn run_video(
        &self,
        graph: &Graph,
        node: &Node,
        provider: VideoProviderKind,
    ) -> Result<(), RunError> {
        let images =
            resolve_images_in(graph, &node.id, "image", self.backends.fetcher.as_ref()).await?;
        let prompt = match resolve_text(graph, &node.id) {
            Some(p) => p,
            None if images.len() >= provider.min_images_for_textless() => String::new(),
            None => {
                return Err(RunError::MissingInput {
                    what: format!(
                        "prompt (or at least {} reference images for {provider})",
                        provider.min_images_for_textless()
                    ),
                });
            }
        };

        // Providers take remote locators only; embedded bytes are staged.
        let mut staged = Vec::with_capacity(images.len());
        for media in &images {
            match media {
                MediaRef::Embedded { mime, .. } => {
                    let bytes = media
                        .decode_embedded()
                        .map_err(|e| ResolveError::from(FetchError::from(e)))?;
                    let url = self.backends.stager.stage(mime, &bytes).await?;
                    staged.push(MediaRef::remote(url));
                }
                MediaRef::Remote { .. } => staged.push(media.clone()),
                MediaRef::Ephemeral { handle } => {
                    return Err(RunError::Unstageable {
                        handle: handle.clone(),
                    });
                }
            }
        }

        let job_id = self
            .backends
            .video
            .submit(&prompt, &staged, &self.config.options)
            .await?;
        self.store.update_node(&node.id, |n| {
            if let NodePayload::VideoProvider { job_id: j, .. } = &mut n.payload {
                *j = Some(job_id.clone());
            }
        });
        let _ = self
            .events
            .send(Event::job(&node.id, job_id.clone(), JobPhase::Submitted));

        let poller = TaskPoller::new(self.config.poll_interval, self.config.poll_max_attempts);
        match poller.poll(self.backends.video.as_ref(), &job_id).await {
            Ok(result) => {
                self.store.update_node(&node.id, |n| {
                    if let NodePayload::VideoProvider { result: r, .. } = &mut n.payload {
                        *r = Some(result.clone());
                    }
                });
                let _ = self
                    .events
                    .send(Event::job(&node.id, job_id, JobPhase::Succeeded));
                let _ = self.events.send(Event::result_ready(&node.id, "video"));
                self.propagate(&node.id, "video", &result);
                self.record_history(&node.id, "submit", &prompt, &staged, &result)
                    .await;
                Ok(())
            }
            Err(e) => {
                let phase = match &e {
                    crate::runtime::PollError::Timeout { .. } => JobPhase::TimedOut,
                    crate::runtime::PollError::JobFailed { .. } => JobPhase::Failed,
                };
                let _ = self.events.send(Event::job(&node.id, job_id, phase));
                Err(e.into())
            }
        }
    }

    /// Cardinality dispatch shared by every generation run.
    async fn dispatch(
        &self,
        prompt: &str,
        images: &[MediaRef],
    ) -> Result<(MediaRef, &'static str), RunError> {
        let generation = self.backends.generation.as_ref();
        let opts = &self.config.options;
        let out = match images {
            [] => (generation.create(prompt, opts).await?, "create"),
            [one] => (generation.edit(prompt, one, opts).await?, "edit"),
            many => (generation.blend(prompt, many, opts).await?, "blend"),
        };
        Ok(out)
    }

    /// Eagerly push a fresh result into directly connected display nodes.
    ///
    /// Image nodes take the reference as their stored source; composition
    /// nodes take it into the track matching the target port's index.
    fn propagate(&self, node_id: &str, port: &str, media: &MediaRef) {
        let snapshot = self.store.snapshot();
        let targets: Vec<(NodeId, String)> = snapshot
            .edges_out(node_id, Some(port))
            .map(|e| (e.target.clone(), e.target_port.clone()))
            .collect();
        for (target, target_port) in targets {
            self.store.update_node(&target, |n| match &mut n.payload {
                NodePayload::Image { source } => *source = Some(media.clone()),
                NodePayload::VideoCompose { tracks, .. } => {
                    // Track ports are 1-based (video-1..), the track vec is not.
                    if let Some(i) = slot_index(&target_port)
                        && (1..=tracks.len()).contains(&i)
                    {
                        tracks[i - 1] = Some(media.clone());
                    }
                }
                _ => {}
            });
        }
    }

    /// Best-effort history append; failures are logged, never surfaced.
    async fn record_history(
        &self,
        node: &str,
        operation: &str,
        prompt: &str,
        inputs: &[MediaRef],
        output: &MediaRef,
    ) {
        let entry = HistoryEntry::new(node, operation, prompt)
            .with_inputs(inputs.to_vec())
            .with_outputs(vec![output.clone()]);
        if let Err(e) = self.backends.history.record(&entry).await {
            tracing::warn!(node, error = %e, "history record failed");
        }
    }

    /// Write a status (and optional error) and notify the bus. A node
    /// deleted mid-run makes this a logged no-op.
    fn set_status(&self, id: &str, status: NodeStatus, error: Option<String>) {
        let applied = self.store.update_node(id, |n| {
            n.status = status;
            n.error = error.clone();
        });
        if !applied {
            tracing::debug!(node = id, "status write skipped; node no longer exists");
            return;
        }
        let event = match error {
            Some(message) => Event::failed(id, message),
            None => Event::status(id, status),
        };
        let _ = self.events.send(event);
    }
}

//! External collaborator contracts.
//!
//! The engine never talks to a generation service directly; it goes through
//! the narrow async traits defined here. Implementations live outside this
//! crate (HTTP clients, provider SDKs); tests use the mocks under
//! `tests/common`.
//!
//! - [`GenerationBackend`]: synchronous-style image generation
//!   (`create` / `edit` / `blend`)
//! - [`VideoJobBackend`]: async job submission and polling for video
//! - [`AssetStager`]: turns embedded bytes into a stable remote locator
//! - [`AssetFetcher`]: fetches any [`MediaRef`] into raw bytes (a
//!   reqwest-backed implementation is provided)
//! - [`HistoryService`]: append-only run history
//!
//! Backend failures carry the remote message verbatim; the orchestrator
//! surfaces it on the failed node without rewording.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::{MediaError, MediaRef};
use crate::types::NodeId;

/// Options forwarded to generation calls. All fields are optional; backends
/// apply their own defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A remote call failed.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    /// The backend reported a failure; the message is surfaced verbatim.
    #[error("{provider}: {message}")]
    #[diagnostic(code(musegraph::backend::remote))]
    Remote { provider: String, message: String },

    /// The call never reached the backend.
    #[error("transport error: {0}")]
    #[diagnostic(code(musegraph::backend::transport))]
    Transport(String),
}

impl BackendError {
    /// Convenience for mock and adapter code.
    #[must_use]
    pub fn remote(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors while materializing a media reference into bytes.
#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Media(#[from] MediaError),

    #[error("fetch failed for {locator}: {message}")]
    #[diagnostic(code(musegraph::fetch::transport))]
    Transport { locator: String, message: String },

    #[error("remote returned status {status} for {locator}")]
    #[diagnostic(code(musegraph::fetch::status))]
    Status { locator: String, status: u16 },
}

/// Synchronous-style generation backend.
///
/// The three variants map one-to-one onto the orchestrator's cardinality
/// dispatch: no images means `create`, one means `edit`, several `blend`.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn create(&self, prompt: &str, opts: &GenOptions) -> Result<MediaRef, BackendError>;

    async fn edit(
        &self,
        prompt: &str,
        image: &MediaRef,
        opts: &GenOptions,
    ) -> Result<MediaRef, BackendError>;

    async fn blend(
        &self,
        prompt: &str,
        images: &[MediaRef],
        opts: &GenOptions,
    ) -> Result<MediaRef, BackendError>;
}

/// Reported state of an external async job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded { result: MediaRef },
    Failed { message: String },
}

impl JobStatus {
    /// Terminal states stop the poller.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Async video job backend: submit once, then poll by job id.
#[async_trait]
pub trait VideoJobBackend: Send + Sync {
    /// Submit a job; returns the provider's job id. Callers must have
    /// staged any embedded bytes beforehand; implementations may reject
    /// non-remote references.
    async fn submit(
        &self,
        prompt: &str,
        images: &[MediaRef],
        opts: &GenOptions,
    ) -> Result<String, BackendError>;

    async fn query(&self, job_id: &str) -> Result<JobStatus, BackendError>;
}

/// Stages raw bytes to a stable remote locator.
#[async_trait]
pub trait AssetStager: Send + Sync {
    async fn stage(&self, mime: &str, bytes: &[u8]) -> Result<String, BackendError>;
}

/// Materializes a media reference into bytes for decoding.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>, FetchError>;
}

/// Default fetcher: decodes embedded payloads locally, GETs remote
/// locators, refuses ephemeral handles.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>, FetchError> {
        match media {
            MediaRef::Embedded { .. } => Ok(media.decode_embedded()?),
            MediaRef::Remote { url } => {
                let response =
                    self.client
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| FetchError::Transport {
                            locator: url.clone(),
                            message: e.to_string(),
                        })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        locator: url.clone(),
                        status: status.as_u16(),
                    });
                }
                let bytes = response.bytes().await.map_err(|e| FetchError::Transport {
                    locator: url.clone(),
                    message: e.to_string(),
                })?;
                Ok(bytes.to_vec())
            }
            MediaRef::Ephemeral { handle } => Err(FetchError::Media(
                MediaError::EphemeralUnfetchable {
                    handle: handle.clone(),
                },
            )),
        }
    }
}

/// One recorded run, appended after a successful generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub node: NodeId,
    /// Which backend variant ran: `create`, `edit`, `blend`, or `submit`.
    pub operation: String,
    pub prompt: String,
    pub inputs: Vec<MediaRef>,
    pub outputs: Vec<MediaRef>,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        node: impl Into<NodeId>,
        operation: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            operation: operation.into(),
            prompt: prompt.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<MediaRef>) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<MediaRef>) -> Self {
        self.outputs = outputs;
        self
    }
}

/// Append-only history sink. Returns the eventual locator of the record.
#[async_trait]
pub trait HistoryService: Send + Sync {
    async fn record(&self, entry: &HistoryEntry) -> Result<String, BackendError>;
}

/// History sink that drops everything. Recording is best-effort; this is
/// the default when no service is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHistory;

#[async_trait]
impl HistoryService for NullHistory {
    async fn record(&self, _entry: &HistoryEntry) -> Result<String, BackendError> {
        Ok(String::new())
    }
}

//! Mock backends for orchestrator and poller tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use musegraph::backends::{
    AssetFetcher, AssetStager, BackendError, FetchError, GenOptions, GenerationBackend,
    HistoryEntry, HistoryService, JobStatus, VideoJobBackend,
};
use musegraph::media::MediaRef;
use rustc_hash::FxHashMap;

/// One observed generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenCall {
    pub operation: &'static str,
    pub prompt: String,
    pub images: Vec<MediaRef>,
}

/// Generation backend that records every call and answers from a script.
///
/// With an empty script every call succeeds with a distinct remote
/// reference, so most tests only need `RecordingBackend::default()`.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<GenCall>>>,
    script: Arc<Mutex<VecDeque<Result<MediaRef, String>>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next unanswered call.
    pub fn push_outcome(&self, outcome: Result<MediaRef, String>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<GenCall> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: GenCall) -> Result<MediaRef, BackendError> {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.len();
        calls.push(call.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(media)) => Ok(media),
            Some(Err(message)) => Err(BackendError::remote("mock", message)),
            None => Ok(MediaRef::remote(format!(
                "https://cdn.test/{}-{n}.png",
                call.operation
            ))),
        }
    }
}

#[async_trait]
impl GenerationBackend for RecordingBackend {
    async fn create(&self, prompt: &str, _opts: &GenOptions) -> Result<MediaRef, BackendError> {
        self.answer(GenCall {
            operation: "create",
            prompt: prompt.to_string(),
            images: Vec::new(),
        })
    }

    async fn edit(
        &self,
        prompt: &str,
        image: &MediaRef,
        _opts: &GenOptions,
    ) -> Result<MediaRef, BackendError> {
        self.answer(GenCall {
            operation: "edit",
            prompt: prompt.to_string(),
            images: vec![image.clone()],
        })
    }

    async fn blend(
        &self,
        prompt: &str,
        images: &[MediaRef],
        _opts: &GenOptions,
    ) -> Result<MediaRef, BackendError> {
        self.answer(GenCall {
            operation: "blend",
            prompt: prompt.to_string(),
            images: images.to_vec(),
        })
    }
}

/// One observed video submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitCall {
    pub prompt: String,
    pub images: Vec<MediaRef>,
}

/// Video backend with a scripted sequence of query answers.
#[derive(Clone, Default)]
pub struct ScriptedVideoBackend {
    submissions: Arc<Mutex<Vec<SubmitCall>>>,
    queries: Arc<Mutex<VecDeque<Result<JobStatus, String>>>>,
    query_count: Arc<Mutex<usize>>,
}

impl ScriptedVideoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the answer for the next query. `Err` simulates a transient
    /// transport failure.
    pub fn push_status(&self, status: Result<JobStatus, String>) {
        self.queries.lock().unwrap().push_back(status);
    }

    pub fn submissions(&self) -> Vec<SubmitCall> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        *self.query_count.lock().unwrap()
    }
}

#[async_trait]
impl VideoJobBackend for ScriptedVideoBackend {
    async fn submit(
        &self,
        prompt: &str,
        images: &[MediaRef],
        _opts: &GenOptions,
    ) -> Result<String, BackendError> {
        self.submissions.lock().unwrap().push(SubmitCall {
            prompt: prompt.to_string(),
            images: images.to_vec(),
        });
        Ok("job-1".to_string())
    }

    async fn query(&self, _job_id: &str) -> Result<JobStatus, BackendError> {
        *self.query_count.lock().unwrap() += 1;
        match self.queries.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(BackendError::Transport(message)),
            None => Ok(JobStatus::Running),
        }
    }
}

/// Stager that keeps staged bytes in memory and hands out fake URLs.
#[derive(Clone, Default)]
pub struct MemoryStager {
    staged: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemoryStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staged(&self) -> Vec<(String, Vec<u8>)> {
        self.staged.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStager for MemoryStager {
    async fn stage(&self, mime: &str, bytes: &[u8]) -> Result<String, BackendError> {
        let mut staged = self.staged.lock().unwrap();
        let url = format!("https://staged.test/{}", staged.len());
        staged.push((mime.to_string(), bytes.to_vec()));
        Ok(url)
    }
}

/// Fetcher backed by an in-memory locator map; embedded references decode
/// locally like the real one.
#[derive(Clone, Default)]
pub struct MapFetcher {
    by_locator: Arc<Mutex<FxHashMap<String, Vec<u8>>>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<String>, bytes: Vec<u8>) {
        self.by_locator.lock().unwrap().insert(locator.into(), bytes);
    }
}

#[async_trait]
impl AssetFetcher for MapFetcher {
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>, FetchError> {
        if let MediaRef::Embedded { .. } = media {
            return Ok(media.decode_embedded()?);
        }
        let locator = media.as_locator();
        self.by_locator
            .lock()
            .unwrap()
            .get(&locator)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                locator,
                status: 404,
            })
    }
}

/// History sink that remembers every entry.
#[derive(Clone, Default)]
pub struct RecordingHistory {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryService for RecordingHistory {
    async fn record(&self, entry: &HistoryEntry) -> Result<String, BackendError> {
        let mut entries = self.entries.lock().unwrap();
        entries.push(entry.clone());
        Ok(format!("history/{}", entries.len()))
    }
}

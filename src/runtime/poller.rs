//! Polling loop for externally-async jobs.
//!
//! Video providers return a job id at submission time; [`TaskPoller`]
//! queries it at a fixed interval until a terminal state or the attempt
//! ceiling. Transient query errors are swallowed (the job may well still be
//! running); only the ceiling converts into a timeout failure.

use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

use crate::backends::{JobStatus, VideoJobBackend};
use crate::media::MediaRef;

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default attempt ceiling (a ten-minute ceiling at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;

/// Why polling ended without a result.
#[derive(Debug, Error, Diagnostic)]
pub enum PollError {
    /// The backend reported the job failed; message verbatim.
    #[error("job {job_id} failed: {message}")]
    #[diagnostic(code(musegraph::poller::job_failed))]
    JobFailed { job_id: String, message: String },

    /// The attempt ceiling was exceeded without a terminal state.
    #[error("job {job_id} timed out after {attempts} polls")]
    #[diagnostic(
        code(musegraph::poller::timeout),
        help("The job may still complete remotely; re-running the node submits a fresh job.")
    )]
    Timeout { job_id: String, attempts: u32 },
}

/// Fixed-interval, bounded-attempt poller.
#[derive(Clone, Copy, Debug)]
pub struct TaskPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for TaskPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TaskPoller {
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll `job_id` until it succeeds, fails, or the ceiling is hit.
    ///
    /// The first query happens immediately; the interval separates
    /// subsequent attempts. Once a terminal state is observed no further
    /// query is issued.
    pub async fn poll(
        &self,
        backend: &dyn VideoJobBackend,
        job_id: &str,
    ) -> Result<MediaRef, PollError> {
        for attempt in 1..=self.max_attempts {
            match backend.query(job_id).await {
                Ok(JobStatus::Succeeded { result }) => return Ok(result),
                Ok(JobStatus::Failed { message }) => {
                    return Err(PollError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                Ok(JobStatus::Pending | JobStatus::Running) => {
                    tracing::trace!(job_id, attempt, "job still in flight");
                }
                // Transient query failures never abort the job.
                Err(e) => {
                    tracing::debug!(job_id, attempt, error = %e, "poll query failed; retrying");
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(PollError::Timeout {
            job_id: job_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

//! Run-time execution: orchestration of node runs and async job polling.
//!
//! [`Orchestrator`] drives single, batch, and video-provider runs against
//! pluggable backends; [`TaskPoller`] resolves externally-async jobs.
//! [`RuntimeConfig`] gathers the tunables, with `.env` overrides resolved
//! through [`dotenvy`].

pub mod orchestrator;
pub mod poller;

pub use orchestrator::{Backends, Orchestrator, RunError};
pub use poller::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, PollError, TaskPoller};

use std::time::Duration;

use crate::backends::GenOptions;

/// How a batch node's slot calls are issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// One slot call at a time, in slot order.
    #[default]
    Sequential,
    /// All slot calls in flight at once; each writes back as it settles.
    Concurrent,
}

/// Tunables for the orchestrator and poller.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Interval between job polls.
    pub poll_interval: Duration,
    /// Poll attempt ceiling before a job counts as timed out.
    pub poll_max_attempts: u32,
    /// Default slot dispatch for batch nodes.
    pub batch_mode: BatchMode,
    /// Generation options forwarded to every backend call.
    pub options: GenOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_max_attempts: DEFAULT_MAX_ATTEMPTS,
            batch_mode: BatchMode::default(),
            options: GenOptions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Reads `MUSEGRAPH_POLL_INTERVAL_SECS`, `MUSEGRAPH_POLL_MAX_ATTEMPTS`,
    /// and `MUSEGRAPH_BATCH_MODE` (`sequential` or `concurrent`), loading a
    /// `.env` file first if one is present.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("MUSEGRAPH_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_parse::<u32>("MUSEGRAPH_POLL_MAX_ATTEMPTS") {
            config.poll_max_attempts = attempts;
        }
        if let Ok(mode) = std::env::var("MUSEGRAPH_BATCH_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "concurrent" => config.batch_mode = BatchMode::Concurrent,
                "sequential" => config.batch_mode = BatchMode::Sequential,
                other => tracing::warn!(value = other, "unrecognized MUSEGRAPH_BATCH_MODE"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_poll_max_attempts(mut self, attempts: u32) -> Self {
        self.poll_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: GenOptions) -> Self {
        self.options = options;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

//! Engine events emitted for the (excluded) renderer and other observers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeStatus, PortId};

/// A notification emitted by the orchestrator or poller.
///
/// Events are observational only: subscribers cannot influence a run, and a
/// dropped subscriber never stalls the engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// A node's run status changed.
    Status {
        node: NodeId,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        when: DateTime<Utc>,
    },
    /// One slot of a batch node settled (result or per-slot failure).
    SlotSettled {
        node: NodeId,
        slot: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        when: DateTime<Utc>,
    },
    /// A node produced a result on one of its output ports.
    ResultReady {
        node: NodeId,
        port: PortId,
        when: DateTime<Utc>,
    },
    /// Async job lifecycle (submission, terminal state, timeout).
    Job {
        node: NodeId,
        job_id: String,
        phase: JobPhase,
        when: DateTime<Utc>,
    },
}

/// Coarse lifecycle phases of an external async job.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Submitted,
    Succeeded,
    Failed,
    TimedOut,
}

impl Event {
    pub fn status(node: impl Into<NodeId>, status: NodeStatus) -> Self {
        Self::Status {
            node: node.into(),
            status,
            error: None,
            when: Utc::now(),
        }
    }

    pub fn failed(node: impl Into<NodeId>, error: impl Into<String>) -> Self {
        Self::Status {
            node: node.into(),
            status: NodeStatus::Failed,
            error: Some(error.into()),
            when: Utc::now(),
        }
    }

    pub fn slot_settled(node: impl Into<NodeId>, slot: usize, error: Option<String>) -> Self {
        Self::SlotSettled {
            node: node.into(),
            slot,
            error,
            when: Utc::now(),
        }
    }

    pub fn result_ready(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self::ResultReady {
            node: node.into(),
            port: port.into(),
            when: Utc::now(),
        }
    }

    pub fn job(node: impl Into<NodeId>, job_id: impl Into<String>, phase: JobPhase) -> Self {
        Self::Job {
            node: node.into(),
            job_id: job_id.into(),
            phase,
            when: Utc::now(),
        }
    }

    /// The node this event concerns.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::Status { node, .. }
            | Self::SlotSettled { node, .. }
            | Self::ResultReady { node, .. }
            | Self::Job { node, .. } => node,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                node,
                status,
                error: Some(err),
                ..
            } => write!(f, "[{node}] {status}: {err}"),
            Self::Status { node, status, .. } => write!(f, "[{node}] {status}"),
            Self::SlotSettled {
                node,
                slot,
                error: Some(err),
                ..
            } => write!(f, "[{node}] slot {slot} failed: {err}"),
            Self::SlotSettled { node, slot, .. } => write!(f, "[{node}] slot {slot} settled"),
            Self::ResultReady { node, port, .. } => write!(f, "[{node}] result on {port}"),
            Self::Job {
                node,
                job_id,
                phase,
                ..
            } => write!(f, "[{node}] job {job_id}: {phase:?}"),
        }
    }
}

//! Outcome types for single fetches and batches.
//!
//! A batch owns one [`FetchOutcome`] slot per missing fragment. Slots start
//! out `Pending` and are resolved exactly once by the fetch they belong to.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::fragment::FragmentName;
use crate::error::VolleyError;

/// Identifier for one dispatched batch, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Why a single fetch failed. This is the error payload handed to failure
/// callbacks.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FetchError {
    /// Network, DNS, or body read failure, or a request that could not be built
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A wrapped response could not be unwrapped
    #[error("invalid envelope: {message}")]
    Envelope { message: String },

    /// No response within the configured fetch timeout
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The fetch task panicked or was cancelled before reporting
    #[error("fetch aborted: {message}")]
    Aborted { message: String },
}

impl FetchError {
    /// Low-cardinality label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Envelope { .. } => "envelope",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Aborted { .. } => "aborted",
        }
    }
}

impl From<VolleyError> for FetchError {
    fn from(err: VolleyError) -> Self {
        FetchError::Transport {
            message: err.to_string(),
        }
    }
}

/// A fragment that was fetched (or was already present) and is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loaded {
    pub name: FragmentName,
    pub url: String,
}

/// A fragment whose fetch failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub name: FragmentName,
    pub url: String,
    pub error: FetchError,
}

/// State of one slot in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FetchOutcome {
    #[default]
    Pending,
    Success,
    Failure(FailedEntry),
}

impl FetchOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, FetchOutcome::Pending)
    }
}

impl From<std::result::Result<Loaded, FailedEntry>> for FetchOutcome {
    fn from(result: std::result::Result<Loaded, FailedEntry>) -> Self {
        match result {
            Ok(_) => FetchOutcome::Success,
            Err(failed) => FetchOutcome::Failure(failed),
        }
    }
}

/// Payload of a batch's failure callback: every failed entry, in the order
/// the fragments were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_id: BatchId,
    pub failed_entries: Vec<FailedEntry>,
}

impl BatchFailure {
    pub fn failed_names(&self) -> Vec<&FragmentName> {
        self.failed_entries.iter().map(|e| &e.name).collect()
    }
}

/// Combined result of one batch load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// No descriptors were given; nothing happened
    Skipped,
    /// Every requested fragment is registered. `fetched` counts network
    /// fetches; zero means the whole batch was already present.
    Loaded { fetched: usize },
    /// At least one fetch failed. Fragments that did load stay registered.
    Failed(BatchFailure),
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchReport::Loaded { .. })
    }
}

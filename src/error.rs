//! Error types for the multiplexer.

use thiserror::Error;

/// Result type alias using the multiplexer error type.
pub type Result<T> = std::result::Result<T, MultiplexerError>;

/// Why a [`FetchContext`](crate::context::FetchContext) stopped being live.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The token (or one of its ancestors) was cancelled
    #[error("context canceled")]
    Cancelled,

    /// The deadline carried by the context has passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Failure of a single item fetch.
///
/// The orchestrator treats every variant the same way: the first one recorded
/// aborts the batch. The variants only exist so logs and responses say what went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The identifier could not be turned into a request
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network or protocol failure while talking to the remote end
    #[error("Get \"{url}\": {reason}")]
    Transport { url: String, reason: String },

    /// The item's context was cancelled or ran out of time mid-request
    #[error("Get \"{url}\": {cause}")]
    Interrupted { url: String, cause: ContextError },

    /// The task running the fetch died without producing a result
    #[error("fetch task failed: {reason}")]
    TaskFailed { reason: String },
}

impl FetchError {
    /// True if the fetch gave up because its deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(
            self,
            FetchError::Interrupted {
                cause: ContextError::DeadlineExceeded,
                ..
            }
        )
    }

    /// The identifier the failure belongs to, when known.
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Interrupted { url, .. } => Some(url),
            FetchError::TaskFailed { .. } => None,
        }
    }
}

/// Main error type for the multiplexer.
#[derive(Error, Debug)]
pub enum MultiplexerError {
    /// The batch was rejected before any work started (bad JSON, too many URLs)
    #[error("{0}")]
    Validation(String),

    /// The admission gate had no free slot
    #[error("capacity exceeded")]
    AdmissionRejected { capacity: usize },

    /// The first item failure observed in a batch
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The caller's context died before the batch could be scheduled in full
    #[error(transparent)]
    Aborted(#[from] ContextError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

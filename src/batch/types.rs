//! Wire and domain types for a batch of URLs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MultiplexerError, Result};

/// Default upper bound on the number of URLs in one batch.
pub const MAX_URLS: usize = 20;

/// Unique identifier for a batch, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
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
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Inbound request body: `{"urls": [...]}`.
///
/// A missing `urls` field is an empty batch; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

impl BatchRequest {
    /// Reject batches larger than `max_urls` before any work is scheduled.
    pub fn validate(&self, max_urls: usize) -> Result<()> {
        if self.urls.len() > max_urls {
            return Err(MultiplexerError::Validation(
                "too many URLs in request".to_string(),
            ));
        }
        Ok(())
    }
}

/// One successfully retrieved URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub body: String,
}

/// How a single item of a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Body retrieved and stored in the aggregator
    Succeeded,
    /// Fetch failed; the error was offered to the batch's error slot
    Failed,
    /// The item's context was already dead when its slot came up
    Skipped,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Succeeded => "succeeded",
            ItemOutcome::Failed => "failed",
            ItemOutcome::Skipped => "skipped",
        }
    }
}

//! Batch fan-out/fan-in: one orchestrator per batch driving a bounded pool of
//! item fetches into a shared aggregator.

pub mod aggregator;
pub mod fetcher;
pub mod orchestrator;
pub mod types;

pub use aggregator::{ErrorSlot, ResultAggregator};
pub use fetcher::ItemFetcher;
pub use orchestrator::{BatchOrchestrator, OrchestratorConfig};
pub use types::{BatchId, BatchRequest, FetchResult, ItemOutcome, MAX_URLS};

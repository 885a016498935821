//! Application state for HTTP handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionGate;
use crate::batch::{BatchOrchestrator, OrchestratorConfig};
use crate::config::LimitSettings;
use crate::http::HttpClient;

/// Application state shared across all HTTP handlers.
///
/// The admission gate lives here rather than in a global so that tests can
/// build independent servers with their own capacity.
pub struct AppState<H: HttpClient> {
    /// Runs each admitted batch.
    pub orchestrator: Arc<BatchOrchestrator<H>>,
    /// Process-wide cap on concurrent batches.
    pub admission: AdmissionGate,
    /// Largest batch accepted by the handler.
    pub max_urls: usize,
    /// Root token; every request context is derived from it.
    pub shutdown: CancellationToken,
}

impl<H: HttpClient> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            admission: self.admission.clone(),
            max_urls: self.max_urls,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<H: HttpClient + 'static> AppState<H> {
    /// Build state from configured limits.
    pub fn new(http_client: Arc<H>, limits: &LimitSettings, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator: Arc::new(BatchOrchestrator::new(
                http_client,
                OrchestratorConfig::from(limits),
            )),
            admission: AdmissionGate::new(limits.admission_capacity),
            max_urls: limits.max_urls,
            shutdown,
        }
    }
}

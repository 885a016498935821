//! Bounded, fail-fast fan-out of one batch of URLs.
//!
//! ```text
//!            ┌──────── permit (K) ────────┐
//! urls ──> schedule ──spawn──> item task ──ok──> ResultAggregator
//!             │                    └──err──> ErrorSlot ──cancel──> batch ctx
//!             └── stops once the batch ctx is dead
//! drain: join every spawned task, then report results or the single error
//! ```
//!
//! The orchestrator always waits for every dispatched task before returning,
//! even after the first failure. Stragglers are told to stop through the batch
//! context, so the wait is bounded by the per-item timeout.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::aggregator::{ErrorSlot, ResultAggregator};
use super::fetcher::ItemFetcher;
use super::types::{BatchId, FetchResult, ItemOutcome};
use crate::context::FetchContext;
use crate::error::{FetchError, MultiplexerError, Result};
use crate::http::HttpClient;

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of item fetches running at once within one batch
    pub max_parallel_fetches: usize,

    /// Deadline for each individual item, in milliseconds
    pub item_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_fetches: 4,
            item_timeout_ms: 1000,
        }
    }
}

impl OrchestratorConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

impl From<&crate::config::LimitSettings> for OrchestratorConfig {
    fn from(limits: &crate::config::LimitSettings) -> Self {
        OrchestratorConfig {
            max_parallel_fetches: limits.max_parallel_fetches,
            item_timeout_ms: limits.item_timeout_ms,
        }
    }
}

/// State shared by the item tasks of one batch.
struct BatchShared {
    results: ResultAggregator,
    error: ErrorSlot,
}

/// Runs batches of URL fetches with bounded parallelism and fail-fast abort.
pub struct BatchOrchestrator<H: HttpClient> {
    fetcher: ItemFetcher<H>,
    config: OrchestratorConfig,
}

impl<H> BatchOrchestrator<H>
where
    H: HttpClient + 'static,
{
    pub fn new(http_client: Arc<H>, config: OrchestratorConfig) -> Self {
        Self {
            fetcher: ItemFetcher::new(http_client),
            config,
        }
    }

    /// Fetch every URL, or fail with the first error observed.
    ///
    /// Results come back in completion order. The batch size is trusted: callers
    /// validate it before getting here.
    ///
    /// # Errors
    /// - [`MultiplexerError::Fetch`] with the first item failure; no partial results
    /// - [`MultiplexerError::Aborted`] if `parent` died before every item was scheduled
    #[tracing::instrument(skip(self, urls, parent), fields(batch_id = %BatchId::new(), batch_size = urls.len()))]
    pub async fn fetch(&self, urls: Vec<String>, parent: &FetchContext) -> Result<Vec<FetchResult>> {
        let batch = parent.child();
        let shared = Arc::new(BatchShared {
            results: ResultAggregator::with_capacity(urls.len()),
            error: ErrorSlot::new(),
        });
        let workers = Arc::new(Semaphore::new(self.config.max_parallel_fetches.max(1)));
        let item_timeout = self.config.item_timeout();

        let mut join_set: JoinSet<ItemOutcome> = JoinSet::new();
        let mut interrupted = None;

        for url in urls {
            if let Err(cause) = parent.check() {
                interrupted = Some(cause);
                break;
            }
            if batch.is_cancelled() {
                tracing::debug!("Batch aborted, not scheduling remaining items");
                break;
            }

            // Wait for a free worker slot unless the batch dies first
            let permit = tokio::select! {
                permit = workers.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = batch.done() => break,
            };

            let item_ctx = batch.with_timeout(item_timeout);
            let batch_ctx = batch.clone();
            let fetcher = self.fetcher.clone();
            let shared = shared.clone();

            join_set.spawn(async move {
                // Permit is held for the duration of this task
                let _permit = permit;

                if let Err(cause) = item_ctx.check() {
                    tracing::trace!(url = %url, "Batch already aborted, skipping item");
                    // No-op if a real failure got there first
                    shared.error.record(FetchError::Interrupted { url, cause });
                    return ItemOutcome::Skipped;
                }

                match fetcher.fetch(&url, &item_ctx).await {
                    Ok(body) => {
                        shared.results.push(FetchResult { url, body });
                        ItemOutcome::Succeeded
                    }
                    Err(error) => {
                        if shared.error.record(error.clone()) {
                            tracing::warn!(error = %error, "Item failed, aborting batch");
                        } else {
                            tracing::debug!(error = %error, "Item failed after batch was aborted");
                        }
                        batch_ctx.cancel();
                        ItemOutcome::Failed
                    }
                }
            });
        }

        // The loop can also stop because the parent died after its last check
        if interrupted.is_none()
            && let Err(cause) = parent.check()
        {
            interrupted = Some(cause);
        }

        if let Some(cause) = interrupted {
            tracing::info!(reason = %cause, "Caller context ended, cancelling batch");
            batch.cancel();
        }

        // Drain: nothing spawned is abandoned
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Item task panicked");
                    shared.error.record(FetchError::TaskFailed {
                        reason: join_error.to_string(),
                    });
                    batch.cancel();
                    ItemOutcome::Failed
                }
            };
            counter!("multiplexer_items_total", "outcome" => outcome.as_str()).increment(1);
        }

        if let Some(cause) = interrupted {
            counter!("multiplexer_batches_total", "status" => "aborted").increment(1);
            return Err(MultiplexerError::Aborted(cause));
        }

        if let Some(error) = shared.error.get() {
            counter!("multiplexer_batches_total", "status" => "failed").increment(1);
            return Err(error.clone().into());
        }

        let results = shared.results.take();
        counter!("multiplexer_batches_total", "status" => "succeeded").increment(1);
        tracing::info!(results = results.len(), "Batch completed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use crate::http::{HttpResponse, MockHttpClient};
    use std::collections::HashSet;
    use tokio::time::Instant;

    fn orchestrator(
        max_parallel_fetches: usize,
        item_timeout_ms: u64,
    ) -> (Arc<MockHttpClient>, BatchOrchestrator<MockHttpClient>) {
        let mock = Arc::new(MockHttpClient::new());
        let orchestrator = BatchOrchestrator::new(
            mock.clone(),
            OrchestratorConfig {
                max_parallel_fetches,
                item_timeout_ms,
            },
        );
        (mock, orchestrator)
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://a.test/{i}")).collect()
    }

    fn transport_error(url: &str) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_all_items_succeed() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        mock.add_response("http://a.test/x", Ok(HttpResponse::ok("body-x")));
        mock.add_response("http://a.test/y", Ok(HttpResponse::ok("body-y")));

        let results = orchestrator
            .fetch(
                vec!["http://a.test/x".to_string(), "http://a.test/y".to_string()],
                &FetchContext::new(),
            )
            .await
            .unwrap();

        let got: HashSet<(String, String)> =
            results.into_iter().map(|r| (r.url, r.body)).collect();
        let expected: HashSet<(String, String)> = [
            ("http://a.test/x".to_string(), "body-x".to_string()),
            ("http://a.test/y".to_string(), "body-y".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_results_cover_every_input() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let input = urls(20);
        for (i, url) in input.iter().enumerate() {
            mock.add_response_with_delay(
                url,
                Ok(HttpResponse::ok(format!("body-{i}"))),
                Duration::from_millis((20 - i as u64) * 2),
            );
        }

        let results = orchestrator
            .fetch(input.clone(), &FetchContext::new())
            .await
            .unwrap();

        assert_eq!(results.len(), input.len());
        let got: HashSet<String> = results.into_iter().map(|r| r.url).collect();
        assert_eq!(got, input.into_iter().collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds_without_calls() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let results = orchestrator
            .fetch(Vec::new(), &FetchContext::new())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallelism_is_bounded() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let input = urls(12);
        for url in &input {
            mock.add_response_with_delay(url, Ok(HttpResponse::ok("ok")), Duration::from_millis(25));
        }

        let results = orchestrator
            .fetch(input, &FetchContext::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 12);
        assert_eq!(mock.call_count(), 12);
        assert!(
            mock.peak_in_flight() <= 4,
            "more than 4 fetches ran at once: {}",
            mock.peak_in_flight()
        );
        assert!(mock.peak_in_flight() > 1, "fetches never overlapped");
    }

    #[tokio::test]
    async fn test_zero_parallelism_is_clamped_to_one() {
        let (mock, orchestrator) = orchestrator(0, 1000);
        let input = urls(3);
        for url in &input {
            mock.add_response_with_delay(url, Ok(HttpResponse::ok("ok")), Duration::from_millis(5));
        }

        let results = orchestrator
            .fetch(input, &FetchContext::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(mock.peak_in_flight(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_after_successes_returns_only_the_error() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let input = urls(3);
        mock.add_response(&input[0], Ok(HttpResponse::ok("first")));
        mock.add_response(&input[2], Ok(HttpResponse::ok("third")));
        // The failure lands after the other two have completed
        mock.add_response_with_delay(
            &input[1],
            Err(transport_error(&input[1])),
            Duration::from_millis(30),
        );

        let outcome = orchestrator.fetch(input.clone(), &FetchContext::new()).await;

        // Both successes completed, yet the caller sees nothing but the error
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.in_flight_count(), 0);
        match outcome {
            Err(MultiplexerError::Fetch(FetchError::Transport { url, .. })) => {
                assert_eq!(url, input[1])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_item_exceeding_deadline_fails_batch() {
        let (mock, orchestrator) = orchestrator(4, 50);
        let input = urls(3);
        mock.add_response(&input[0], Ok(HttpResponse::ok("first")));
        mock.add_response_with_delay(&input[1], Ok(HttpResponse::ok("late")), Duration::from_secs(5));
        mock.add_response(&input[2], Ok(HttpResponse::ok("third")));

        let start = Instant::now();
        let err = orchestrator
            .fetch(input.clone(), &FetchContext::new())
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(1));
        match err {
            MultiplexerError::Fetch(e) => {
                assert!(e.is_deadline_exceeded(), "unexpected error: {e}");
                assert_eq!(e.url(), Some(input[1].as_str()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_cancels_in_flight_siblings_and_drains() {
        let (mock, orchestrator) = orchestrator(4, 5000);
        let input = urls(4);
        // Three stragglers that would otherwise hang until the item timeout
        let _triggers: Vec<_> = input[1..]
            .iter()
            .map(|url| mock.add_response_with_trigger(url, Ok(HttpResponse::ok("never"))))
            .collect();
        mock.add_response_with_delay(
            &input[0],
            Err(transport_error(&input[0])),
            Duration::from_millis(20),
        );

        let start = Instant::now();
        let err = orchestrator
            .fetch(input.clone(), &FetchContext::new())
            .await
            .unwrap_err();

        // The retained error is the real failure, not a sibling's cancellation
        assert!(matches!(err, MultiplexerError::Fetch(FetchError::Transport { .. })));
        assert!(start.elapsed() < Duration::from_secs(2));
        // Every dispatched fetch finished before we returned
        assert_eq!(mock.in_flight_count(), 0);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_failure_stops_scheduling_of_pending_items() {
        let (mock, orchestrator) = orchestrator(1, 1000);
        let input = urls(5);
        mock.add_response(&input[0], Err(transport_error(&input[0])));
        for url in &input[1..] {
            mock.add_response(url, Ok(HttpResponse::ok("ok")));
        }

        let err = orchestrator
            .fetch(input, &FetchContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MultiplexerError::Fetch(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_surface_exactly_one() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let input = urls(4);
        for url in &input {
            mock.add_response_with_delay(url, Err(transport_error(url)), Duration::from_millis(10));
        }

        let err = orchestrator
            .fetch(input.clone(), &FetchContext::new())
            .await
            .unwrap_err();

        // Which one wins is a race, but it must be one of ours
        match err {
            MultiplexerError::Fetch(e) => {
                assert!(input.iter().any(|u| Some(u.as_str()) == e.url()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_parent_aborts_before_any_fetch() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let parent = FetchContext::new();
        parent.cancel();

        let err = orchestrator.fetch(urls(3), &parent).await.unwrap_err();

        assert!(matches!(
            err,
            MultiplexerError::Aborted(ContextError::Cancelled)
        ));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_parent_reports_deadline() {
        let (mock, orchestrator) = orchestrator(4, 1000);
        let parent = FetchContext::new().with_deadline(Instant::now());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let err = orchestrator.fetch(urls(2), &parent).await.unwrap_err();

        assert!(matches!(
            err,
            MultiplexerError::Aborted(ContextError::DeadlineExceeded)
        ));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_parent_cancelled_while_waiting_for_slot() {
        let (mock, orchestrator) = orchestrator(1, 5000);
        let input = urls(3);
        let _trigger = mock.add_response_with_trigger(&input[0], Ok(HttpResponse::ok("never")));

        let parent = FetchContext::new();
        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let err = orchestrator.fetch(input, &parent).await.unwrap_err();

        assert!(matches!(
            err,
            MultiplexerError::Aborted(ContextError::Cancelled)
        ));
        // Only the first item ever got a slot, and it was drained before returning
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_parent_deadline_caps_item_deadline() {
        let (mock, orchestrator) = orchestrator(4, 60_000);
        mock.add_response_with_delay(
            "http://a.test/slow",
            Ok(HttpResponse::ok("late")),
            Duration::from_secs(5),
        );

        let parent = FetchContext::new().with_deadline(Instant::now() + Duration::from_millis(40));
        let start = Instant::now();
        let err = orchestrator
            .fetch(vec!["http://a.test/slow".to_string()], &parent)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(err, MultiplexerError::Fetch(e) if e.is_deadline_exceeded()));
    }

    /// Answers `/0` immediately and cancels the caller's context while doing
    /// so. Every other URL hangs until its context ends.
    struct CancelParentOnFirst {
        parent: FetchContext,
    }

    #[async_trait::async_trait]
    impl HttpClient for CancelParentOnFirst {
        async fn get(
            &self,
            url: &reqwest::Url,
            _timeout: Option<Duration>,
        ) -> std::result::Result<HttpResponse, FetchError> {
            if url.path() == "/0" {
                self.parent.cancel();
                return Ok(HttpResponse::ok("first"));
            }
            std::future::pending().await
        }
    }

    fn cancelled_by_parent(outcome: &Result<Vec<FetchResult>>) -> bool {
        matches!(
            outcome,
            Err(MultiplexerError::Aborted(ContextError::Cancelled))
                | Err(MultiplexerError::Fetch(FetchError::Interrupted {
                    cause: ContextError::Cancelled,
                    ..
                }))
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_parent_cancelled_after_scheduling_never_yields_partial_results() {
        let parent = FetchContext::new();
        let orchestrator = BatchOrchestrator::new(
            Arc::new(CancelParentOnFirst {
                parent: parent.clone(),
            }),
            OrchestratorConfig {
                max_parallel_fetches: 4,
                item_timeout_ms: 5000,
            },
        );

        // All three items are scheduled before the first one completes
        let outcome = orchestrator.fetch(urls(3), &parent).await;

        assert!(cancelled_by_parent(&outcome), "unexpected outcome: {outcome:?}");
    }

    #[test_log::test(tokio::test)]
    async fn test_parent_cancelled_during_last_slot_wait_never_yields_partial_results() {
        let parent = FetchContext::new();
        let orchestrator = BatchOrchestrator::new(
            Arc::new(CancelParentOnFirst {
                parent: parent.clone(),
            }),
            OrchestratorConfig {
                max_parallel_fetches: 1,
                item_timeout_ms: 5000,
            },
        );

        // The second URL waits for the only slot while the first one succeeds
        // and kills the parent at the same moment
        let outcome = orchestrator.fetch(urls(2), &parent).await;

        assert!(cancelled_by_parent(&outcome), "unexpected outcome: {outcome:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_parent_cancellation_is_never_a_success() {
        for _ in 0..20 {
            let parent = FetchContext::new();
            let orchestrator = BatchOrchestrator::new(
                Arc::new(CancelParentOnFirst {
                    parent: parent.clone(),
                }),
                OrchestratorConfig {
                    max_parallel_fetches: 2,
                    item_timeout_ms: 5000,
                },
            );

            let outcome = orchestrator.fetch(urls(4), &parent).await;
            assert!(cancelled_by_parent(&outcome), "unexpected outcome: {outcome:?}");
        }
    }

    #[test]
    fn test_config_from_limits() {
        let limits = crate::config::LimitSettings {
            max_parallel_fetches: 8,
            item_timeout_ms: 250,
            ..Default::default()
        };
        let config = OrchestratorConfig::from(&limits);
        assert_eq!(config.max_parallel_fetches, 8);
        assert_eq!(config.item_timeout(), Duration::from_millis(250));
        assert_eq!(OrchestratorConfig::default().item_timeout(), Duration::from_secs(1));
    }
}

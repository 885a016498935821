//! HTTP client abstraction for retrieving a single resource.
//!
//! This module defines the `HttpClient` trait to abstract request execution,
//! enabling testability with mock implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{ContextError, FetchError};

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Trait for executing GET requests.
///
/// Implementations are not required to watch the caller's cancellation token:
/// the [`ItemFetcher`](crate::batch::ItemFetcher) races every call against the
/// item context and drops the future when the context dies.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let url = Url::parse("https://example.com/")?;
/// let response = client.get(&url, Some(Duration::from_secs(1))).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch `url` and buffer the whole body.
    ///
    /// # Arguments
    /// * `url` - Absolute http(s) URL
    /// * `timeout` - Time left before the item's deadline, if any
    ///
    /// # Errors
    /// Returns a [`FetchError`] if the request cannot be built, fails in
    /// transport, or times out. Non-2xx statuses are not errors.
    async fn get(
        &self,
        url: &Url,
        timeout: Option<Duration>,
    ) -> std::result::Result<HttpResponse, FetchError>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
///
/// This implementation makes real HTTP requests to external endpoints.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new reqwest-based HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing, already configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, url, timeout), fields(url = %url))]
    async fn get(
        &self,
        url: &Url,
        timeout: Option<Duration>,
    ) -> std::result::Result<HttpResponse, FetchError> {
        tracing::debug!(
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Executing HTTP request"
        );

        let mut req = self.client.get(url.clone());
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await.map_err(|e| {
            tracing::debug!(error = %e, "HTTP request failed");
            classify(url, e)
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(url, e))?;

        tracing::debug!(status, response_len = body.len(), "HTTP request completed");

        Ok(HttpResponse { status, body })
    }
}

fn classify(url: &Url, error: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if error.is_timeout() {
        FetchError::Interrupted {
            url,
            cause: ContextError::DeadlineExceeded,
        }
    } else if error.is_builder() {
        FetchError::InvalidUrl {
            url,
            reason: error.to_string(),
        }
    } else {
        FetchError::Transport {
            url,
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

type MockResult = std::result::Result<HttpResponse, FetchError>;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses per URL without making actual
/// HTTP calls, and keeps track of how many calls are running at once.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response("http://a.test/x", Ok(HttpResponse::ok("x")));
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait before completing.
enum MockResponse {
    /// Immediate response
    Immediate(MockResult),
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: MockResult,
        trigger: oneshot::Receiver<()>,
    },
    /// Response that completes after a fixed delay
    Delayed { response: MockResult, delay: Duration },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub timeout: Option<Duration>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predetermined response for a URL.
    ///
    /// Multiple responses can be added for the same URL - they will be
    /// returned in FIFO order.
    pub fn add_response(&self, url: &str, response: MockResult) {
        self.push(url, MockResponse::Immediate(response));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the call to complete with the given response.
    pub fn add_response_with_trigger(&self, url: &str, response: MockResult) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            url,
            MockResponse::Triggered {
                response,
                trigger: rx,
            },
        );
        tx
    }

    /// Add a response that completes after `delay`.
    pub fn add_response_with_delay(&self, url: &str, response: MockResult, delay: Duration) {
        self.push(url, MockResponse::Delayed { response, delay });
    }

    fn push(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(normalize(url))
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of calls currently in-flight (executing).
    ///
    /// Dropped (aborted) calls are decremented too.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in-flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &Url, timeout: Option<Duration>) -> MockResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        // Decrement even if the call is dropped mid-flight
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            url: url.to_string(),
            timeout,
        });

        let mock_response = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(url.as_str())
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed on send or drop alike
                let _ = trigger.await;
                response
            }
            Some(MockResponse::Delayed { response, delay }) => {
                tokio::time::sleep(delay).await;
                response
            }
            None => Err(FetchError::Transport {
                url: url.to_string(),
                reason: "no mock response configured".to_string(),
            }),
        }
    }
}

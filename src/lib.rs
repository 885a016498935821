//! Fan-out URL fetching with bounded parallelism and fail-fast semantics.
//!
//! A batch of URLs is fetched concurrently, at most a fixed number at a time,
//! each under its own deadline. The first failure cancels the rest of the batch
//! and becomes the batch's result; otherwise every body comes back. A
//! process-wide [`AdmissionGate`] caps how many batches run at once, and the
//! [`server`] module exposes all of this over HTTP.

pub mod admission;
pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use admission::{AdmissionGate, AdmissionTicket};
pub use batch::*;
pub use config::MultiplexerConfig;
pub use context::FetchContext;
pub use error::{ContextError, FetchError, MultiplexerError, Result};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};

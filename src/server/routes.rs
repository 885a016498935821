//! Router construction and request handlers.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use super::middleware::admission_limit;
use super::state::AppState;
use crate::batch::BatchRequest;
use crate::context::FetchContext;
use crate::error::{MultiplexerError, Result};
use crate::http::HttpClient;

/// Build the application router.
///
/// Only `POST /` is served. Everything else, including other methods on `/`,
/// is a 404. Every route sits behind the admission gate.
pub fn create_router<H: HttpClient + 'static>(state: AppState<H>) -> Router {
    let admission = state.admission.clone();

    Router::new()
        .route("/", post(fetch_urls::<H>).fallback(not_found))
        .fallback(not_found)
        .layer(from_fn_with_state(admission, admission_limit))
        .with_state(state)
}

/// Fetch every URL in the request body and return the bodies as JSON.
#[tracing::instrument(skip(state, body), fields(request_len = body.len()))]
pub async fn fetch_urls<H: HttpClient + 'static>(
    State(state): State<AppState<H>>,
    body: Bytes,
) -> Result<Response> {
    let request: BatchRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejecting malformed request body");
        MultiplexerError::Validation("Invalid JSON".to_string())
    })?;
    request.validate(state.max_urls)?;

    // The batch dies with the connection or with the server
    let ctx = FetchContext::from_token(state.shutdown.child_token());
    let _guard = ctx.drop_guard();

    let results = state.orchestrator.fetch(request.urls, &ctx).await?;
    let encoded = serde_json::to_vec(&results)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        encoded,
    )
        .into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}

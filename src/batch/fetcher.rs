//! Retrieval of a single URL under an item context.

use std::sync::Arc;

use reqwest::Url;

use crate::context::FetchContext;
use crate::error::FetchError;
use crate::http::HttpClient;

/// Fetches one URL, giving up as soon as its context is cancelled or expires.
pub struct ItemFetcher<H: HttpClient> {
    client: Arc<H>,
}

impl<H: HttpClient> Clone for ItemFetcher<H> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<H: HttpClient> ItemFetcher<H> {
    pub fn new(client: Arc<H>) -> Self {
        Self { client }
    }

    /// Retrieve `url` and return its body.
    ///
    /// Malformed URLs, transport failures and an expired or cancelled context
    /// all come back as a [`FetchError`]. The call never outlives `ctx`.
    #[tracing::instrument(skip(self, ctx), fields(url = %url))]
    pub async fn fetch(&self, url: &str, ctx: &FetchContext) -> Result<String, FetchError> {
        let parsed = parse_url(url)?;

        let response = ctx
            .run(self.client.get(&parsed, ctx.remaining()))
            .await
            .map_err(|cause| FetchError::Interrupted {
                url: url.to_string(),
                cause,
            })??;

        tracing::trace!(
            status = response.status,
            response_len = response.body.len(),
            "Item fetched"
        );

        Ok(response.body)
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported protocol scheme \"{scheme}\""),
        }),
    }
}

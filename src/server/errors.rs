//! HTTP status mapping for [`MultiplexerError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::MultiplexerError;

impl MultiplexerError {
    /// Status code reported to HTTP clients.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MultiplexerError::Validation(_) => StatusCode::BAD_REQUEST,
            MultiplexerError::AdmissionRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
            MultiplexerError::Fetch(_)
            | MultiplexerError::Aborted(_)
            | MultiplexerError::Serialization(_)
            | MultiplexerError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MultiplexerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            MultiplexerError::Fetch(_) | MultiplexerError::Aborted(_) => format!("Error: {self}"),
            MultiplexerError::Serialization(_) => "Failed to encode response".to_string(),
            _ => self.to_string(),
        };
        (status, body).into_response()
    }
}

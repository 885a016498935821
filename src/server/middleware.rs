//! Admission control middleware.
//!
//! Every request has to win a slot on the [`AdmissionGate`] before it reaches a
//! handler. Losers get `429 Too Many Requests` and nothing else happens.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;

use crate::admission::AdmissionGate;
use crate::error::MultiplexerError;

pub async fn admission_limit(
    State(gate): State<AdmissionGate>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ticket) = gate.try_acquire() else {
        counter!("multiplexer_admission_rejected_total").increment(1);
        tracing::warn!(capacity = gate.capacity(), "Admission rejected, at capacity");
        return MultiplexerError::AdmissionRejected {
            capacity: gate.capacity(),
        }
        .into_response();
    };

    tracing::trace!(in_use = gate.in_use(), "Admitted request");
    let response = next.run(request).await;
    ticket.release();
    response
}

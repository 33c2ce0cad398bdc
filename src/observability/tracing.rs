//! Request spans for the admin API.
//!
//! Every span carries the request id assigned by the request-id layer, so
//! store, plugin and archive log lines emitted while handling a request can
//! be correlated.

use axum::http::Request;
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Span factory for `TraceLayer::make_span_with`.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "admin_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

//! Tracing integration for control requests.

use crate::protocol::RequestCode;
use tracing::{Level, Span, span};

/// Create a span covering one control request.
///
/// # Example
///
/// ```rust,ignore
/// use virtio_user::observability::span_request;
/// use virtio_user::protocol::RequestCode;
///
/// let span = span_request(RequestCode::SetOwner);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_request(request: RequestCode) -> Span {
    span!(Level::DEBUG, "vhost_request", request = %request)
}

/// Enter a request span, returning the guard.
pub fn instrument_request(request: RequestCode) -> tracing::span::EnteredSpan {
    span_request(request).entered()
}

/// Log a request about to be sent.
#[inline]
pub fn trace_request(request: RequestCode, size: u32, fds: usize) {
    tracing::info!("{}", request);
    tracing::debug!(request = %request, size, fds, "sending request");
}

/// Log a failed request.
#[inline]
pub fn trace_request_error(request: RequestCode, error: &dyn std::error::Error) {
    tracing::error!(request = %request, error = %error, "request failed");
}

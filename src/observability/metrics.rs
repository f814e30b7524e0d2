//! Metrics collection using metrics-rs.

use crate::protocol::RequestCode;
use metrics::{Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const REQUESTS_SENT: &str = "virtio_user_requests_sent";
const REPLIES_RECEIVED: &str = "virtio_user_replies_received";
const REQUEST_ERRORS: &str = "virtio_user_request_errors";
const BYTES_SENT: &str = "virtio_user_bytes_sent";
const REQUEST_TIME_NS: &str = "virtio_user_request_time_ns";
const MEMORY_REGIONS: &str = "virtio_user_memory_regions";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(REQUESTS_SENT, Unit::Count, "Control requests sent");
    metrics::describe_counter!(
        REPLIES_RECEIVED,
        Unit::Count,
        "Validated replies received from the backend"
    );
    metrics::describe_counter!(
        REQUEST_ERRORS,
        Unit::Count,
        "Control requests that failed"
    );
    metrics::describe_counter!(BYTES_SENT, Unit::Bytes, "Bytes written to the control socket");
    metrics::describe_histogram!(
        REQUEST_TIME_NS,
        Unit::Nanoseconds,
        "Time from building a request to its validated reply"
    );
    metrics::describe_gauge!(
        MEMORY_REGIONS,
        Unit::Count,
        "Regions in the last memory table sent"
    );
}

/// Record a request written to the socket.
#[inline]
pub fn record_request_sent(request: RequestCode) {
    counter!(REQUESTS_SENT, "request" => request.name()).increment(1);
}

/// Record a validated reply.
#[inline]
pub fn record_reply_received(request: RequestCode) {
    counter!(REPLIES_RECEIVED, "request" => request.name()).increment(1);
}

/// Record a failed request.
#[inline]
pub fn record_request_error(request: RequestCode) {
    counter!(REQUEST_ERRORS, "request" => request.name()).increment(1);
}

/// Record bytes written to the control socket.
#[inline]
pub fn record_bytes_sent(bytes: usize) {
    counter!(BYTES_SENT).increment(bytes as u64);
}

/// Record the size of the memory table being sent.
#[inline]
pub fn record_memory_regions(regions: usize) {
    gauge!(MEMORY_REGIONS).set(regions as f64);
}

/// Record how long one request took.
#[inline]
pub fn record_request_time(request: RequestCode, duration: Duration) {
    histogram!(REQUEST_TIME_NS, "request" => request.name()).record(duration.as_nanos() as f64);
}

/// Guard that records request time when dropped.
pub struct RequestTimer {
    request: RequestCode,
    start: Instant,
}

impl RequestTimer {
    /// Start timing `request`.
    pub fn start(request: RequestCode) -> Self {
        Self {
            request,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_time(self.request, self.start.elapsed());
    }
}

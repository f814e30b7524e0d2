//! Observability: metrics and tracing.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `virtio_user_requests_sent` | Counter | Requests written, by request name |
//! | `virtio_user_replies_received` | Counter | Validated replies, by request name |
//! | `virtio_user_request_errors` | Counter | Failed requests, by request name |
//! | `virtio_user_bytes_sent` | Counter | Bytes written to the control socket |
//! | `virtio_user_request_time_ns` | Histogram | Build-to-reply time per request |
//! | `virtio_user_memory_regions` | Gauge | Regions in the last memory table |
//!
//! ## Tracing
//!
//! Each dispatcher call runs inside a `vhost_request` span and logs the
//! canonical request name at INFO.

mod metrics;
mod tracing_support;

pub use metrics::{
    RequestTimer, init_metrics, record_bytes_sent, record_memory_regions, record_reply_received,
    record_request_error, record_request_sent, record_request_time,
};
pub use tracing_support::{instrument_request, span_request, trace_request, trace_request_error};

//! Metrics instrumentation for API traffic.

use std::time::Instant;

pub fn record_request_latency(duration_ms: f64) {
    ::metrics::histogram!("tio_request_latency", duration_ms);
}

pub fn increment_retry_count() {
    ::metrics::counter!("tio_request_retries", 1);
}

pub fn increment_failure_count() {
    ::metrics::counter!("tio_request_failures", 1);
}

/// RAII timer recording request latency on drop.
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_latency(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

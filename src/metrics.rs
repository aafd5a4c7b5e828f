use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ── Metric names ────────────────────────────────────────────────────────

/// Total HTTP requests by endpoint and status
pub const REQUESTS_TOTAL: &str = "helmsman_requests_total";
/// Request duration in seconds
pub const REQUEST_DURATION: &str = "helmsman_request_duration_seconds";
/// Manifest rewrites by effective policy
pub const MANIFEST_REWRITES: &str = "helmsman_manifest_rewrites_total";
/// Completed transfers by cached/uncached classification
pub const TRANSFER_CLASSIFICATIONS: &str = "helmsman_transfer_classifications_total";
/// Upstream fetch errors
pub const UPSTREAM_FETCH_ERRORS: &str = "helmsman_upstream_fetch_errors_total";
/// Requests that hit the transfer deadline
pub const REQUEST_TIMEOUTS: &str = "helmsman_request_timeouts_total";
/// Streams with a populated template index
pub const ACTIVE_STREAMS: &str = "helmsman_active_streams";
/// Clients with a throughput record
pub const KNOWN_CLIENTS: &str = "helmsman_known_clients";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an incoming request
pub fn record_request(endpoint: &str, status: u16) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record request duration
pub fn record_duration(endpoint: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    histogram!(REQUEST_DURATION, "endpoint" => endpoint.to_string()).record(duration);
}

/// Record a manifest rewrite under the policy that was applied
pub fn record_rewrite(policy: &str) {
    counter!(MANIFEST_REWRITES, "policy" => policy.to_string()).increment(1);
}

/// Record a completed transfer's cached/uncached classification
pub fn record_classification(cached: bool) {
    let class = if cached { "cached" } else { "uncached" };
    counter!(TRANSFER_CLASSIFICATIONS, "class" => class).increment(1);
}

/// Record an upstream fetch error
pub fn record_upstream_error() {
    counter!(UPSTREAM_FETCH_ERRORS).increment(1);
}

/// Record a request that exceeded its transfer deadline
pub fn record_timeout() {
    counter!(REQUEST_TIMEOUTS).increment(1);
}

/// Update the known-stream count
pub fn set_active_streams(count: usize) {
    gauge!(ACTIVE_STREAMS).set(count as f64);
}

/// Update the known-client count
pub fn set_known_clients(count: usize) {
    gauge!(KNOWN_CLIENTS).set(count as f64);
}

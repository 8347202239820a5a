//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vrestore_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vrestore_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vrestore_http_requests_in_flight";

    // Webhook metrics
    pub const WEBHOOKS_RECEIVED_TOTAL: &str = "vrestore_webhooks_received_total";
    pub const WEBHOOK_STALE_WRITES_TOTAL: &str = "vrestore_webhook_stale_writes_total";

    // Pipeline metrics
    pub const UPLOADS_TOTAL: &str = "vrestore_uploads_total";
    pub const SUBMISSIONS_TOTAL: &str = "vrestore_submissions_total";
    pub const HISTORY_WRITES_TOTAL: &str = "vrestore_history_writes_total";
    pub const HISTORY_READS_TOTAL: &str = "vrestore_history_reads_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vrestore_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a webhook delivery and how it was handled.
pub fn record_webhook(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::WEBHOOKS_RECEIVED_TOTAL, &labels).increment(1);
}

/// Record a webhook write rejected by the staleness guard.
pub fn record_stale_write() {
    counter!(names::WEBHOOK_STALE_WRITES_TOTAL).increment(1);
}

/// Record an upload relayed to the storage service.
pub fn record_upload(role: &str, outcome: &str) {
    let labels = [
        ("role", role.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
}

/// Record a job submission to the inference provider.
pub fn record_submission(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

/// Record a history record insert.
pub fn record_history_write(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::HISTORY_WRITES_TOTAL, &labels).increment(1);
}

/// Record a history list read.
pub fn record_history_read() {
    counter!(names::HISTORY_READS_TOTAL).increment(1);
}

/// Record a rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    // Replace UUIDs and numeric IDs with placeholders
    let path =
        regex_lite::Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .unwrap()
            .replace_all(path, ":id");
    let path = regex_lite::Regex::new(r"/[0-9]+(/|$)")
        .unwrap()
        .replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/v1/replicate/prediction"),
            "/api/v1/replicate/prediction"
        );
        assert_eq!(
            sanitize_path("/api/v1/db/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/db/:id"
        );
        assert_eq!(sanitize_path("/api/v1/jobs/12345"), "/api/v1/jobs/:id");
    }
}

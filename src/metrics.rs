//! Prometheus metrics for Tollgate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "tollgate_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tollgate_http_request_duration_seconds";

/// Delivery attempts by terminal outcome (counter). Labels: bucket, outcome.
pub const DELIVERIES_TOTAL: &str = "tollgate_deliveries_total";

/// Tokens rejected at the edge (counter). Labels: reason.
pub const TOKEN_REJECTIONS_TOTAL: &str = "tollgate_token_rejections_total";

/// Tokens minted by the grant service (counter). Labels: bucket.
pub const TOKENS_ISSUED_TOTAL: &str = "tollgate_tokens_issued_total";

/// Total object bytes sent to clients (counter). Labels: bucket.
pub const BYTES_SENT_TOTAL: &str = "tollgate_bytes_sent_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(DELIVERIES_TOTAL, "Delivery attempts by terminal outcome");
    describe_counter!(TOKEN_REJECTIONS_TOTAL, "Tokens rejected at the edge");
    describe_counter!(TOKENS_ISSUED_TOTAL, "Tokens minted by the grant service");
    describe_counter!(BYTES_SENT_TOTAL, "Total object bytes sent to clients");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    // Do not instrument the metrics endpoint itself.
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// Both surfaces have a small closed route set; anything else is
/// collapsed to `/other` so stray probes cannot blow up label
/// cardinality.
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/grant" | "/grant/batch" | "/openapi.json" => {
            path.to_string()
        }
        _ => "/other".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus recorder not initialized");
    let body = handle.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_root() {
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalize_path_known_routes() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/grant"), "/grant");
        assert_eq!(normalize_path("/grant/batch"), "/grant/batch");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
    }

    #[test]
    fn test_normalize_path_unknown_collapses() {
        assert_eq!(normalize_path("/favicon.ico"), "/other");
        assert_eq!(normalize_path("/some/random/probe"), "/other");
    }
}

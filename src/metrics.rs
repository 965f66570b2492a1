// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the vendor service, scraped from GET /metrics.
//
// - HTTP traffic is recorded once per request by `track_http`
// - Domain metrics cover metric recomputation and acknowledgments
// =============================================================================

use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint (route template), status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: trigger (order_created, order_updated, ...)
pub const VENDOR_METRIC_RECOMPUTATIONS_TOTAL: &str = "vendor_metric_recomputations_total";

pub const VENDOR_METRIC_RECOMPUTE_DURATION_SECONDS: &str =
    "vendor_metric_recompute_duration_seconds";

pub const PURCHASE_ORDERS_ACKNOWLEDGED_TOTAL: &str = "purchase_orders_acknowledged_total";

/// Labels: operation (get/set/delete)
pub const CACHE_OPERATION_DURATION_SECONDS: &str = "cache_operation_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

// =============================================================================
// SETUP
// =============================================================================

fn builder() -> Result<PrometheusBuilder> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(VENDOR_METRIC_RECOMPUTE_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(CACHE_OPERATION_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?;
    Ok(builder)
}

/// Install the Prometheus recorder globally and return the render handle.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = builder()?.install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(
        VENDOR_METRIC_RECOMPUTATIONS_TOTAL,
        "Vendor performance recomputations, by triggering write"
    );
    describe_histogram!(
        VENDOR_METRIC_RECOMPUTE_DURATION_SECONDS,
        "Time spent recomputing and storing vendor metrics"
    );
    describe_counter!(
        PURCHASE_ORDERS_ACKNOWLEDGED_TOTAL,
        "Purchase orders acknowledged by vendors"
    );
    describe_histogram!(
        CACHE_OPERATION_DURATION_SECONDS,
        "Vendor cache operation latency in seconds"
    );

    Ok(handle)
}

/// A handle whose recorder is not installed globally. Renders nothing;
/// lets tests build an `AppState` without touching the global recorder.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// =============================================================================
// RECORDING HELPERS
// =============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_recompute(trigger: &str, duration_secs: f64) {
    counter!(VENDOR_METRIC_RECOMPUTATIONS_TOTAL, "trigger" => trigger.to_string()).increment(1);
    histogram!(VENDOR_METRIC_RECOMPUTE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_acknowledgment() {
    counter!(PURCHASE_ORDERS_ACKNOWLEDGED_TOTAL).increment(1);
}

pub fn record_cache_operation(operation: &str, duration_secs: f64) {
    histogram!(
        CACHE_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

// =============================================================================
// HTTP MIDDLEWARE
// =============================================================================
/// Record count and latency of every request under its route template
/// (`/vendors/:id/`), so ids don't explode label cardinality.
pub async fn track_http(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

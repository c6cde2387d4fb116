//! Prometheus metrics for the StudioJade server.
//!
//! HTTP request counters and latency histograms are recorded by middleware.
//! Roster cache and telemetry figures live in their own atomics and are
//! published as gauges/counters when `/metrics/prometheus` is scraped.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use studiojade_core::{CacheStats, MetricsReport};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Roster cache metrics
    pub const ROSTER_CACHE_HITS_TOTAL: &str = "roster_cache_hits_total";
    pub const ROSTER_CACHE_MISSES_TOTAL: &str = "roster_cache_misses_total";
    pub const ROSTER_STALE_SERVED_TOTAL: &str = "roster_stale_served_total";
    pub const ROSTER_FETCHES_TOTAL: &str = "roster_fetches_total";
    pub const ROSTER_FETCH_FAILURES_TOTAL: &str = "roster_fetch_failures_total";
    pub const ROSTER_MEMBERS: &str = "roster_members";
    pub const ROSTER_CACHE_AGE_SECONDS: &str = "roster_cache_age_seconds";
    pub const ROSTER_LAST_FETCH_SECONDS: &str = "roster_last_fetch_seconds";

    // Client telemetry
    pub const TELEMETRY_SAMPLES_TOTAL: &str = "telemetry_samples_total";
}

/// Routes served by this binary; anything else is labelled `other`.
const KNOWN_ROUTES: [&str; 8] = [
    "/",
    "/contributors",
    "/metrics",
    "/metrics/prometheus",
    "/cm",
    "/collect-metrics",
    "/healthz",
    "/readyz",
];

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: the scrape endpoint renders from the handle.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    let route = route_label(path);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => route,
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => route
    )
    .record(duration.as_secs_f64());
}

/// Publish roster cache counters and gauges.
pub fn publish_cache_stats(stats: &CacheStats) {
    counter!(names::ROSTER_CACHE_HITS_TOTAL).absolute(stats.hits);
    counter!(names::ROSTER_CACHE_MISSES_TOTAL).absolute(stats.misses);
    counter!(names::ROSTER_STALE_SERVED_TOTAL).absolute(stats.stale_served);
    counter!(names::ROSTER_FETCHES_TOTAL).absolute(stats.fetches);
    counter!(names::ROSTER_FETCH_FAILURES_TOTAL).absolute(stats.fetch_failures);
    gauge!(names::ROSTER_MEMBERS).set(stats.members as f64);
    gauge!(names::ROSTER_LAST_FETCH_SECONDS).set(stats.last_fetch_ms as f64 / 1000.0);
    if let Some(age) = stats.age_secs {
        gauge!(names::ROSTER_CACHE_AGE_SECONDS).set(age as f64);
    }
}

/// Publish client telemetry totals.
pub fn publish_telemetry(report: &MetricsReport) {
    counter!(names::TELEMETRY_SAMPLES_TOTAL).absolute(report.retention.samples_received);
}

/// Label for a request path, bounded to the known routes.
fn route_label(path: &str) -> &'static str {
    let trimmed = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    KNOWN_ROUTES
        .iter()
        .find(|r| **r == trimmed)
        .copied()
        .unwrap_or("other")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("/"), "/");
        assert_eq!(route_label("/cm"), "/cm");
        assert_eq!(route_label("/metrics/"), "/metrics");
        assert_eq!(route_label("/wp-admin/login.php"), "other");
    }
}

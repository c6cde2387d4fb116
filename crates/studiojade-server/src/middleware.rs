use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{metrics, server::AppState};

/// Paths whose timings are excluded from the dashboard's response-time list.
const UNTIMED_PREFIXES: [&str; 5] = ["/metrics", "/cm", "/collect-metrics", "/healthz", "/readyz"];

/// Preserve or generate an `x-request-id` and echo it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = match req.headers().get(&header_name) {
        Some(value) => value.clone(),
        None => HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };

    // Visible to the trace span and handlers.
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Time each request, feeding Prometheus and the telemetry aggregator.
pub async fn track_response_time(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let res = next.run(req).await;
    let elapsed = started.elapsed();

    metrics::record_http_request(method.as_str(), &path, res.status().as_u16(), elapsed);
    if is_timed_path(&path) {
        state.telemetry.record_response_time(elapsed);
    }
    res
}

fn is_timed_path(path: &str) -> bool {
    !UNTIMED_PREFIXES.iter().any(|p| path.starts_with(p))
}

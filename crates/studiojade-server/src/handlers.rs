use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};
use serde::Serialize;
use serde_json::Value;
use studiojade_core::{ClientSample, render, render_contributors};
use time::{OffsetDateTime, UtcOffset};

use crate::{dashboard::DashboardReport, error::ApiError, metrics, server::AppState};

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

/// Roster page.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let roster = state.cache.get_roster().await;
    let now = local_now(state.config.site.utc_offset_hours);
    let body = render(&roster, now, &state.site);
    let cache_control = format!("public, max-age={}", state.config.site.page_max_age_secs);
    ([(header::CACHE_CONTROL, cache_control)], Html(body))
}

pub async fn contributors(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_contributors(
        &state.config.site.contributors_image_url,
        &state.config.site.repository_url,
    ))
}

pub async fn metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(dashboard(&state))
}

pub async fn dashboard_html(State(state): State<AppState>) -> impl IntoResponse {
    Html(dashboard(&state).render_html(&state.config.site.title))
}

/// Accept one client telemetry sample.
pub async fn collect_metrics(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(value) = payload?;
    let sample = ClientSample::from_json(value)?;
    state.telemetry.record(&sample);
    Ok(Json(serde_json::json!({ "status": "success" })))
}

pub async fn prometheus(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    metrics::publish_cache_stats(&state.cache.stats());
    metrics::publish_telemetry(&state.telemetry.snapshot());
    let body = metrics::render_metrics()
        .ok_or_else(|| ApiError::Internal("Prometheus recorder not initialized".into()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once a roster has been cached.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.cache.is_populated() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "degraded" }),
        )
    }
}

fn dashboard(state: &AppState) -> DashboardReport {
    DashboardReport::new(
        state.cache.stats(),
        state.telemetry.snapshot(),
        state.uptime().as_secs(),
    )
}

fn local_now(offset_hours: i8) -> OffsetDateTime {
    let offset = UtcOffset::from_hms(offset_hours, 0, 0).unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

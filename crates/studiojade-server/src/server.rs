use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use studiojade_core::{
    CoreError, HttpRosterFetcher, MetricsAggregator, RosterCache, RosterSource, SiteOptions,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{config::AppConfig, handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RosterCache>,
    pub telemetry: Arc<MetricsAggregator>,
    pub site: Arc<SiteOptions>,
    pub config: Arc<AppConfig>,
    pub started_at: Instant,
}

impl AppState {
    /// Build state around the HTTP roster fetcher described by `config`.
    ///
    /// The configuration is validated first, so states built outside
    /// `load_config` get the same checks.
    pub fn from_config(config: AppConfig) -> studiojade_core::Result<Self> {
        config.validate().map_err(CoreError::configuration)?;
        let fetcher = HttpRosterFetcher::new(config.fetcher_config()?)?;
        Ok(Self::with_source(config, Arc::new(fetcher)))
    }

    /// Build state around any roster source.
    pub fn with_source(config: AppConfig, source: Arc<dyn RosterSource>) -> Self {
        let cache = RosterCache::new(source, config.cache_policy());
        let telemetry = MetricsAggregator::new(config.aggregator_config());
        Self {
            cache: Arc::new(cache),
            telemetry: Arc::new(telemetry),
            site: Arc::new(config.site_options()),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let request_timeout = state.config.request_timeout();

    Router::new()
        // Pages
        .route("/", get(handlers::index))
        .route("/contributors", get(handlers::contributors))
        // Dashboard and telemetry collection
        .route("/metrics", get(handlers::metrics_json))
        .route("/metrics/prometheus", get(handlers::prometheus))
        .route(
            "/cm",
            get(handlers::dashboard_html).post(handlers::collect_metrics),
        )
        .route("/collect-metrics", post(handlers::collect_metrics))
        // Health
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Middleware stack (outermost last: request id -> trace -> timing -> timeout -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::track_response_time,
        ))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

pub struct StudioJadeServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> studiojade_core::Result<StudioJadeServer> {
        crate::metrics::init_metrics();
        let state = AppState::from_config(self.config)?;

        Ok(StudioJadeServer {
            addr: self.addr,
            app: build_app(state),
        })
    }
}

impl StudioJadeServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

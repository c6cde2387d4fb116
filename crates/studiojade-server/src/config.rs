use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use studiojade_core::fetcher::DEFAULT_API_URL;
use studiojade_core::telemetry::thresholds;
use studiojade_core::{AggregatorConfig, CachePolicy, FetcherConfig, SiteOptions};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream roster API
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Page rendering settings
    #[serde(default)]
    pub site: SiteConfig,
    /// Client telemetry retention
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if self.server.worker_threads == Some(0) {
            return Err("server.worker_threads must be > 0".into());
        }
        // Upstream validations
        let fetcher = self
            .fetcher_config()
            .map_err(|e| format!("upstream.api_url is not a valid URL: {e}"))?;
        if self.upstream.timeout_ms == 0 {
            return Err("upstream.timeout_ms must be > 0".into());
        }
        if self.upstream.max_attempts == 0 {
            return Err("upstream.max_attempts must be > 0".into());
        }
        // A page request must outlive a full roster refresh, or the timeout
        // layer cancels it before the cache can fall back.
        let refresh_budget = fetcher.worst_case_duration();
        if self.request_timeout() <= refresh_budget {
            return Err(format!(
                "server.request_timeout_ms must exceed the upstream refresh budget of {}ms \
                 (max_attempts * timeout_ms + backoff)",
                refresh_budget.as_millis()
            ));
        }
        // Cache validations
        if self.cache.fresh_ttl_secs == 0 {
            return Err("cache.fresh_ttl_secs must be > 0".into());
        }
        // Site validations
        if !(-12..=14).contains(&self.site.utc_offset_hours) {
            return Err("site.utc_offset_hours must be between -12 and 14".into());
        }
        if self.site.telemetry_enabled && self.site.telemetry_endpoint.is_empty() {
            return Err("site.telemetry_enabled=true requires site.telemetry_endpoint".into());
        }
        // Telemetry validations
        if self.telemetry.max_samples == 0 {
            return Err("telemetry.max_samples must be > 0".into());
        }
        if self.telemetry.truncate_interval_secs == 0 {
            return Err("telemetry.truncate_interval_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Worker threads for the runtime; defaults to the CPU count.
    pub fn worker_threads(&self) -> usize {
        self.server.worker_threads.unwrap_or_else(num_cpus::get)
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig, url::ParseError> {
        let url = Url::parse(&self.upstream.api_url)?;
        Ok(FetcherConfig::new(url)
            .with_timeout(Duration::from_millis(self.upstream.timeout_ms))
            .with_max_attempts(self.upstream.max_attempts)
            .with_backoff_base(Duration::from_millis(self.upstream.backoff_base_ms)))
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.cache.fresh_ttl_secs),
            Duration::from_secs(self.cache.stale_ttl_secs),
        )
    }

    pub fn site_options(&self) -> SiteOptions {
        SiteOptions {
            title: self.site.title.clone(),
            studio_name: self.site.studio_name.clone(),
            profile_base_url: self.site.profile_base_url.clone(),
            avatar_base_url: self.site.avatar_base_url.clone(),
            telemetry_endpoint: self
                .site
                .telemetry_enabled
                .then(|| self.site.telemetry_endpoint.clone()),
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_samples: self.telemetry.max_samples,
            truncate_interval: Duration::from_secs(self.telemetry.truncate_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Runtime worker threads. If not set, one per CPU.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3244
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_threads: None,
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sleep after failed attempt n is `backoff_base_ms * n`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_upstream_timeout_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_ms: default_upstream_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_fresh_ttl_secs")]
    pub fresh_ttl_secs: u64,
    /// Grace period after `fresh_ttl_secs` during which stale data may be served
    #[serde(default = "default_stale_ttl_secs")]
    pub stale_ttl_secs: u64,
}

fn default_fresh_ttl_secs() -> u64 {
    600
}
fn default_stale_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: default_fresh_ttl_secs(),
            stale_ttl_secs: default_stale_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_studio_name")]
    pub studio_name: String,
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: String,
    #[serde(default = "default_avatar_base_url")]
    pub avatar_base_url: String,
    /// Offset used to compute the studio age shown on the page
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i8,
    #[serde(default = "default_page_max_age_secs")]
    pub page_max_age_secs: u64,
    /// Embed the client telemetry script in the roster page
    #[serde(default = "default_telemetry_enabled")]
    pub telemetry_enabled: bool,
    #[serde(default = "default_telemetry_endpoint")]
    pub telemetry_endpoint: String,
    #[serde(default = "default_contributors_image_url")]
    pub contributors_image_url: String,
    #[serde(default = "default_repository_url")]
    pub repository_url: String,
}

fn default_title() -> String {
    "StudioJade官方网站".into()
}
fn default_studio_name() -> String {
    "StudioJade".into()
}
fn default_profile_base_url() -> String {
    "https://40code.com/#page=user&id=".into()
}
fn default_avatar_base_url() -> String {
    "https://abc.520gxx.com/static/internalapi/asset/".into()
}
fn default_utc_offset_hours() -> i8 {
    8
}
fn default_page_max_age_secs() -> u64 {
    300
}
fn default_telemetry_enabled() -> bool {
    true
}
fn default_telemetry_endpoint() -> String {
    "/cm".into()
}
fn default_contributors_image_url() -> String {
    "https://contrib.rocks/image?repo=StudioJade/website".into()
}
fn default_repository_url() -> String {
    "https://github.com/StudioJade/website".into()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            studio_name: default_studio_name(),
            profile_base_url: default_profile_base_url(),
            avatar_base_url: default_avatar_base_url(),
            utc_offset_hours: default_utc_offset_hours(),
            page_max_age_secs: default_page_max_age_secs(),
            telemetry_enabled: default_telemetry_enabled(),
            telemetry_endpoint: default_telemetry_endpoint(),
            contributors_image_url: default_contributors_image_url(),
            repository_url: default_repository_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_truncate_interval_secs")]
    pub truncate_interval_secs: u64,
}

fn default_max_samples() -> usize {
    thresholds::DEFAULT_MAX_SAMPLES
}
fn default_truncate_interval_secs() -> u64 {
    thresholds::DEFAULT_TRUNCATE_INTERVAL.as_secs()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            truncate_interval_secs: default_truncate_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "studiojade.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., STUDIOJADE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("STUDIOJADE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

//! Upstream roster fetching.
//!
//! [`HttpRosterFetcher`] calls the studio member endpoint, retrying transport,
//! status and decode failures a fixed number of times with linear backoff
//! (`backoff_base * attempt`). It owns no shared state; deciding what to do
//! with a failure is the cache's job.
//!
//! # Example
//!
//! ```ignore
//! use studiojade_core::fetcher::{FetcherConfig, HttpRosterFetcher};
//!
//! let fetcher = HttpRosterFetcher::new(FetcherConfig::default())?;
//! let roster = fetcher.fetch_roster().await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;
use crate::roster::{Roster, RosterResponse};

/// Default upstream endpoint for the StudioJade member list.
pub const DEFAULT_API_URL: &str = "https://api.abc.520gxx.com/studio/user?id=691";

/// Anything that can produce a fresh roster.
///
/// The cache is generic over this so tests can script upstream behaviour.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_roster(&self) -> Result<Roster, FetchError>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Roster endpoint.
    pub api_url: Url,

    /// Per-attempt HTTP timeout (default: 5 seconds).
    pub timeout: Duration,

    /// Total attempts before giving up (default: 3).
    pub max_attempts: u32,

    /// Linear backoff unit; attempt `n` is followed by `n * backoff_base` (default: 1 second).
    pub backoff_base: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default roster URL is valid"),
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl FetcherConfig {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the attempt budget. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay after the given 1-based failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    /// Longest time one `fetch_roster` call can take: every attempt timing
    /// out plus the backoff sleeps between them.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let sleeps: Duration = (1..attempts).map(|n| self.backoff_for(n)).sum();
        self.timeout.saturating_mul(attempts).saturating_add(sleeps)
    }
}

/// Fetches the roster over HTTP with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpRosterFetcher {
    http_client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpRosterFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("studiojade/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Fetch and normalise the roster, retrying up to `max_attempts` times.
    pub async fn fetch_roster(&self) -> Result<Roster, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.fetch_once().await {
                Ok(roster) => {
                    tracing::debug!(attempt, members = roster.len(), "Roster fetched");
                    return Ok(roster);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= max_attempts {
                        tracing::warn!(attempts = attempt, error = %e, "Roster fetch failed, giving up");
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let backoff = self.config.backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Roster fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch_once(&self) -> Result<Roster, FetchError> {
        let response = self
            .http_client
            .get(self.config.api_url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: RosterResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(Roster::from(body))
    }
}

#[async_trait]
impl RosterSource for HttpRosterFetcher {
    async fn fetch_roster(&self) -> Result<Roster, FetchError> {
        HttpRosterFetcher::fetch_roster(self).await
    }
}

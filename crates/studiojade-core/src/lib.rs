pub mod cache;
pub mod error;
pub mod fetcher;
pub mod html;
pub mod render;
pub mod roster;
pub mod telemetry;

pub use cache::{CachePolicy, CacheStats, Freshness, RosterCache};
pub use error::{CoreError, ErrorCategory, FetchError, Result, ValidationError};
pub use fetcher::{FetcherConfig, HttpRosterFetcher, RosterSource};
pub use html::{Markup, escape};
pub use render::{SiteOptions, render, render_contributors, studio_age_days};
pub use roster::{Avatar, Roster, RosterEntry};
pub use telemetry::{AggregatorConfig, ClientSample, MetricsAggregator, MetricsReport, Stat};

//! Single-slot, read-through roster cache with a stale grace period.
//!
//! ```text
//! age < fresh_ttl                    → hit, no fetch
//! age < fresh_ttl + stale_ttl        → refresh; on failure serve the stale roster
//! otherwise / empty                  → refresh; on failure serve an empty roster
//! ```
//!
//! The slot is an [`ArcSwapOption`], so readers never block and a successful
//! refresh replaces roster and timestamp in one pointer swap. Refreshes are
//! single-flight: one async mutex serialises them, and requests that queued
//! behind a refresh reuse its outcome instead of fetching again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::fetcher::RosterSource;
use crate::roster::Roster;

/// Freshness windows for the cached roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age below which the roster is served without contacting upstream (default: 10 minutes).
    pub fresh_ttl: Duration,

    /// Extra grace period during which a stale roster may still be served
    /// if the refresh fails (default: 5 minutes).
    pub stale_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_ttl: Duration::from_secs(600),
            stale_ttl: Duration::from_secs(300),
        }
    }
}

impl CachePolicy {
    pub fn new(fresh_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            fresh_ttl,
            stale_ttl,
        }
    }

    pub fn classify(&self, age: Duration) -> Freshness {
        if age < self.fresh_ttl {
            Freshness::Fresh
        } else if age < self.fresh_ttl.saturating_add(self.stale_ttl) {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

#[derive(Debug)]
struct CachedRoster {
    roster: Arc<Roster>,
    fetched_at: Instant,
}

impl CachedRoster {
    fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    /// Consecutive failures; reset by a successful fetch.
    error_count: AtomicU64,
    last_fetch_ms: AtomicU64,
}

/// Point-in-time view of the cache for dashboards and health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub refreshing: bool,
    pub members: usize,
    pub age_secs: Option<u64>,
    pub last_fetch_ms: u64,
}

impl CacheStats {
    /// Share of lookups answered without contacting upstream, in percent.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / total as f64
        }
    }
}

/// Clears the in-flight flag even if the refreshing request is dropped.
struct RefreshFlag<'a>(&'a AtomicBool);

impl<'a> RefreshFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RefreshFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Read-through cache holding at most one roster.
pub struct RosterCache {
    source: Arc<dyn RosterSource>,
    policy: CachePolicy,
    slot: ArcSwapOption<CachedRoster>,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
    last_error: parking_lot::Mutex<Option<String>>,
    counters: Counters,
    empty: Arc<Roster>,
}

impl RosterCache {
    pub fn new(source: Arc<dyn RosterSource>, policy: CachePolicy) -> Self {
        Self {
            source,
            policy,
            slot: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            refreshing: AtomicBool::new(false),
            last_error: parking_lot::Mutex::new(None),
            counters: Counters::default(),
            empty: Arc::new(Roster::empty()),
        }
    }

    /// Whether any roster has been cached yet.
    pub fn is_populated(&self) -> bool {
        self.slot.load().is_some()
    }

    pub async fn get_roster(&self) -> Arc<Roster> {
        self.get_roster_at(Instant::now()).await
    }

    /// Return the roster as of `now`, refreshing from upstream when needed.
    ///
    /// Never fails: upstream errors degrade to the stale roster (inside the
    /// grace window) or to an empty one.
    pub async fn get_roster_at(&self, now: Instant) -> Arc<Roster> {
        let mut stale = None;
        if let Some(cached) = self.slot.load_full() {
            match self.policy.classify(cached.age_at(now)) {
                Freshness::Fresh => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Arc::clone(&cached.roster);
                }
                Freshness::Stale => stale = Some(cached),
                Freshness::Expired => {}
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let fetches_seen = self.counters.fetches.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if self.counters.fetches.load(Ordering::Acquire) != fetches_seen {
            // A refresh completed while this request was queued.
            if let Some(cached) = self.slot.load_full()
                && self.policy.classify(cached.age_at(now)) == Freshness::Fresh
            {
                return Arc::clone(&cached.roster);
            }
            return self.fallback(stale);
        }

        let started = Instant::now();
        let result = {
            let _flag = RefreshFlag::raise(&self.refreshing);
            self.source.fetch_roster().await
        };
        self.counters
            .last_fetch_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.counters.fetches.fetch_add(1, Ordering::Release);

        match result {
            Ok(roster) => {
                let roster = Arc::new(roster);
                self.slot.store(Some(Arc::new(CachedRoster {
                    roster: Arc::clone(&roster),
                    fetched_at: now,
                })));
                self.counters.error_count.store(0, Ordering::Relaxed);
                *self.last_error.lock() = None;
                tracing::info!(members = roster.len(), "Roster cache refreshed");
                roster
            }
            Err(e) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                let consecutive = self.counters.error_count.fetch_add(1, Ordering::Relaxed) + 1;
                *self.last_error.lock() = Some(e.to_string());
                tracing::warn!(
                    error = %e,
                    consecutive_failures = consecutive,
                    serving_stale = stale.is_some(),
                    "Roster refresh failed"
                );
                self.fallback(stale)
            }
        }
    }

    fn fallback(&self, stale: Option<Arc<CachedRoster>>) -> Arc<Roster> {
        match stale {
            Some(cached) => {
                self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&cached.roster)
            }
            None => Arc::clone(&self.empty),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> CacheStats {
        let cached = self.slot.load_full();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale_served: self.counters.stale_served.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            error_count: self.counters.error_count.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            refreshing: self.refreshing.load(Ordering::Acquire),
            members: cached.as_ref().map(|c| c.roster.len()).unwrap_or(0),
            age_secs: cached.as_ref().map(|c| c.age_at(now).as_secs()),
            last_fetch_ms: self.counters.last_fetch_ms.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RosterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterCache")
            .field("policy", &self.policy)
            .field("populated", &self.is_populated())
            .finish_non_exhaustive()
    }
}

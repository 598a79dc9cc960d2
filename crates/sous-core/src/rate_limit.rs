//! Fixed-window admission control, one budget per upstream.
//!
//! ```text
//! windowStart           windowStart + 60s
//!     |--- count < limit: admit, count += 1 ---|--- roll: count = 0 ---
//! ```
//!
//! Each budget sits behind its own mutex so checking and incrementing happen
//! atomically. [`RateLimiter::try_admit_all`] locks every budget a request
//! needs, in a fixed order, and charges them only if all of them have room.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, add_duration, until};
use crate::error::AppError;

/// Length of every rate window.
pub const WINDOW_LENGTH: Duration = Duration::from_secs(60);

/// An external dependency with its own request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    /// The content source: page scraper or structured recipe API.
    Scraping,
    /// The completion API used for extraction.
    Completion,
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upstream::Scraping => write!(f, "scraping"),
            Upstream::Completion => write!(f, "completion"),
        }
    }
}

/// Per-minute request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub scraping_per_minute: u32,
    pub completion_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scraping_per_minute: 100,
            completion_per_minute: 20,
        }
    }
}

/// Counter state for one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBudget {
    pub upstream: Upstream,
    pub window_start: DateTime<Utc>,
    pub window_length: Duration,
    pub count: u32,
    pub limit: u32,
}

impl RateBudget {
    pub fn new(upstream: Upstream, limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            upstream,
            window_start: now,
            window_length: WINDOW_LENGTH,
            count: 0,
            limit,
        }
    }

    fn window_end(&self) -> DateTime<Utc> {
        add_duration(self.window_start, self.window_length)
    }

    /// Start a fresh window if the current one has elapsed.
    fn roll(&mut self, now: DateTime<Utc>) {
        if now >= self.window_end() {
            self.window_start = now;
            self.count = 0;
        }
    }

    fn has_room(&self) -> bool {
        self.count < self.limit
    }

    fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        until(now, self.window_end())
    }
}

/// Point-in-time view of a budget, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetSnapshot {
    pub upstream: Upstream,
    pub count: u32,
    pub limit: u32,
    pub window_remaining: Duration,
}

/// Process-wide admission control for both upstreams.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    scraping: Mutex<RateBudget>,
    completion: Mutex<RateBudget>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            scraping: Mutex::new(RateBudget::new(
                Upstream::Scraping,
                config.scraping_per_minute,
                now,
            )),
            completion: Mutex::new(RateBudget::new(
                Upstream::Completion,
                config.completion_per_minute,
                now,
            )),
            clock,
        }
    }

    fn budget(&self, upstream: Upstream) -> &Mutex<RateBudget> {
        match upstream {
            Upstream::Scraping => &self.scraping,
            Upstream::Completion => &self.completion,
        }
    }

    /// Acquires a budget lock, recovering from poison if necessary.
    fn lock(&self, upstream: Upstream) -> MutexGuard<'_, RateBudget> {
        self.budget(upstream).lock().unwrap_or_else(|poisoned| {
            tracing::warn!(%upstream, "Recovered from poisoned rate budget mutex");
            poisoned.into_inner()
        })
    }

    /// Admit one request against a single upstream.
    pub fn try_admit(&self, upstream: Upstream) -> bool {
        self.try_admit_all(&[upstream]).is_ok()
    }

    /// Admit one request against every listed upstream, or none of them.
    ///
    /// On denial no budget is charged and the error carries the time left in
    /// the denying window.
    pub fn try_admit_all(&self, upstreams: &[Upstream]) -> Result<(), AppError> {
        let mut wanted = upstreams.to_vec();
        wanted.sort();
        wanted.dedup();

        let now = self.clock.now();
        let mut guards: Vec<MutexGuard<'_, RateBudget>> =
            wanted.iter().map(|u| self.lock(*u)).collect();

        for budget in guards.iter_mut() {
            budget.roll(now);
        }

        if let Some(denied) = guards.iter().find(|b| !b.has_room()) {
            let retry_after = denied.retry_after(now);
            tracing::warn!(
                upstream = %denied.upstream,
                count = denied.count,
                limit = denied.limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit reached"
            );
            return Err(AppError::RateLimited {
                upstream: denied.upstream,
                retry_after,
            });
        }

        for budget in guards.iter_mut() {
            budget.count += 1;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<BudgetSnapshot> {
        let now = self.clock.now();
        [Upstream::Scraping, Upstream::Completion]
            .into_iter()
            .map(|upstream| {
                let mut budget = self.lock(upstream);
                budget.roll(now);
                BudgetSnapshot {
                    upstream,
                    count: budget.count,
                    limit: budget.limit,
                    window_remaining: budget.retry_after(now),
                }
            })
            .collect()
    }
}

//! Adaptive rate limiting
//!
//! One token bucket per rate class. Buckets refill lazily from elapsed time
//! and are reconciled against the quota the remote service reports on every
//! live response, so the local model tracks the authoritative one even when
//! other consumers share the same credential.

use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A pool of endpoints sharing one remote quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RateClass {
    General,
    Search,
    Graphql,
}

impl RateClass {
    pub const ALL: [RateClass; 3] = [Self::General, Self::Search, Self::Graphql];

    /// Bucket size before the service has reported a limit
    pub fn default_capacity(&self) -> f64 {
        match self {
            Self::General | Self::Graphql => 5000.0,
            Self::Search => 30.0,
        }
    }

    /// Window over which the default capacity is replenished
    pub fn default_window(&self) -> Duration {
        match self {
            Self::General | Self::Graphql => Duration::from_secs(3600),
            Self::Search => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Search => "search",
            Self::Graphql => "graphql",
        };
        f.write_str(name)
    }
}

/// Static routing table; longest matching prefix wins
const ROUTES: &[(&str, RateClass)] = &[
    ("/search/", RateClass::Search),
    ("/graphql", RateClass::Graphql),
];

/// Maps an endpoint path (relative to the API base) to its rate class
pub fn classify_endpoint(endpoint: &str) -> RateClass {
    let path = endpoint.split('?').next().unwrap_or_default();
    let path = format!("/{}", path.trim_start_matches('/'));

    ROUTES
        .iter()
        .filter(|(prefix, _)| path.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, class)| *class)
        .unwrap_or(RateClass::General)
}

/// Longest wait a reported reset time can impose
pub const MAX_RESET_WAIT_SECS: i64 = 24 * 60 * 60;

/// Quota state reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: Option<u64>,
    pub remaining: u64,
    pub reset_epoch: i64,
}

impl RateQuota {
    /// Reads `x-ratelimit-*` headers; `None` if remaining or reset is absent
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<i64>().ok();

        let remaining = u64::try_from(number("x-ratelimit-remaining")?).ok()?;
        let reset_epoch = number("x-ratelimit-reset")?;
        let limit = number("x-ratelimit-limit").and_then(|l| u64::try_from(l).ok());

        Some(Self {
            limit,
            remaining,
            reset_epoch,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Seconds from `now_epoch` until reset, at most [`MAX_RESET_WAIT_SECS`]
    ///
    /// Negative when the reset time has already passed.
    pub fn seconds_until_reset(&self, now_epoch: i64) -> i64 {
        self.reset_epoch
            .saturating_sub(now_epoch)
            .min(MAX_RESET_WAIT_SECS)
    }
}

/// Refill rate (tokens/second) that spends `remaining` evenly until reset
///
/// One request is held back, and the time left is clamped to one second so a
/// reset time in the past never yields a negative or infinite rate.
pub fn refill_rate_for(remaining: u64, seconds_until_reset: i64) -> f64 {
    let spendable = remaining.saturating_sub(1) as f64;
    let time_left = seconds_until_reset.max(1) as f64;
    spendable / time_left
}

/// Token bucket for one rate class
#[derive(Debug, Clone)]
pub struct RateBucket {
    class: RateClass,
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
    reset_at: Option<Instant>,
    acquired: u64,
}

impl RateBucket {
    /// Creates a full bucket at the class's default rate
    pub fn new(class: RateClass, now: Instant) -> Self {
        let capacity = class.default_capacity();
        Self {
            class,
            capacity,
            tokens: capacity,
            refill_rate: capacity / class.default_window().as_secs_f64(),
            last_update: now,
            reset_at: None,
            acquired: 0,
        }
    }

    fn default_refill_rate(&self) -> f64 {
        self.capacity / self.class.default_window().as_secs_f64()
    }

    fn refill(&mut self, now: Instant) {
        if let Some(reset) = self.reset_at {
            if now >= reset {
                // The remote quota has rolled over
                self.tokens = self.capacity;
                self.refill_rate = self.default_refill_rate();
                self.reset_at = None;
                self.last_update = now;
                return;
            }
        }

        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Takes one token, or returns how long to wait before one is available
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.acquired += 1;
            return Ok(());
        }

        let until_reset = self
            .reset_at
            .map(|reset| reset.saturating_duration_since(now));

        let wait = if self.refill_rate > 0.0 {
            let by_rate = Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate);
            match until_reset {
                Some(reset) => by_rate.min(reset),
                None => by_rate,
            }
        } else {
            until_reset.unwrap_or(Duration::from_secs(1))
        };

        Err(wait.max(Duration::from_millis(1)))
    }

    /// Adopts the service-reported quota
    pub fn reconcile(&mut self, quota: &RateQuota, now_epoch: i64, now: Instant) {
        self.refill(now);

        let time_left = quota.seconds_until_reset(now_epoch).max(1);
        self.refill_rate = refill_rate_for(quota.remaining, time_left);
        self.reset_at = Some(now + Duration::from_secs(time_left as u64));

        if let Some(limit) = quota.limit {
            self.capacity = (limit as f64).max(1.0);
        }
        self.tokens = self.tokens.min(self.capacity);
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            class: self.class,
            capacity: self.capacity,
            tokens: self.tokens,
            refill_rate: self.refill_rate,
            acquired: self.acquired,
        }
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    pub class: RateClass,
    pub capacity: f64,
    pub tokens: f64,
    pub refill_rate: f64,
    /// Tokens handed out since the bucket was created
    pub acquired: u64,
}

/// Per-class token buckets shared by every request a client issues
pub struct RateLimiter {
    buckets: Mutex<HashMap<RateClass, RateBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let now = Instant::now();
        let buckets = RateClass::ALL
            .iter()
            .map(|class| (*class, RateBucket::new(*class, now)))
            .collect();

        Self {
            buckets: Mutex::new(buckets),
        }
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<RateClass, RateBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a token for `class` is available and takes it
    pub async fn acquire(&self, class: RateClass) {
        loop {
            let wait = match self.try_acquire(class) {
                Ok(()) => return,
                Err(wait) => wait,
            };

            tracing::debug!("No {} token available, waiting {:?}", class, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a token without waiting, or returns the time until one is available
    pub fn try_acquire(&self, class: RateClass) -> Result<(), Duration> {
        let now = Instant::now();
        self.buckets()
            .entry(class)
            .or_insert_with(|| RateBucket::new(class, now))
            .try_acquire(now)
    }

    /// Reconciles the bucket for `class` with a reported quota
    pub fn reconcile(&self, class: RateClass, quota: &RateQuota) {
        let now = Instant::now();
        let now_epoch = chrono::Utc::now().timestamp();

        let mut buckets = self.buckets();
        let bucket = buckets
            .entry(class)
            .or_insert_with(|| RateBucket::new(class, now));
        bucket.reconcile(quota, now_epoch, now);

        tracing::trace!(
            "Reconciled {} bucket: remaining={} reset={} rate={:.4}/s",
            class,
            quota.remaining,
            quota.reset_epoch,
            bucket.refill_rate
        );
    }

    pub fn snapshot(&self, class: RateClass) -> Option<BucketSnapshot> {
        self.buckets().get(&class).map(RateBucket::snapshot)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

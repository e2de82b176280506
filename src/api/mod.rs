//! Remote API access
//!
//! - [`ResponseCache`]: persistent URL-keyed response cache
//! - [`RateLimiter`]: adaptive per-class token buckets
//! - [`ApiClient`]: the cached, rate-limited, retrying client built on both
//! - [`types`]: the response shapes the crawler reads

mod cache;
mod client;
mod limiter;
pub mod types;

pub use cache::ResponseCache;
pub use client::{ApiClient, RetryPolicy};
pub use limiter::{
    classify_endpoint, refill_rate_for, BucketSnapshot, RateBucket, RateClass, RateLimiter,
    RateQuota,
};

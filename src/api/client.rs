//! Rate-limited, cached REST client
//!
//! Request flow for every GET:
//!
//! 1. Serve a fresh cached body if there is one (no token is spent)
//! 2. Take a token from the endpoint's rate class
//! 3. Send the request and reconcile the bucket with the quota headers
//! 4. On quota exhaustion sleep until the reported reset and retry
//! 5. On a transport failure back off briefly and retry
//! 6. Cache and return a successful body; surface any other status

use crate::api::cache::ResponseCache;
use crate::api::limiter::{classify_endpoint, RateClass, RateLimiter, RateQuota};
use crate::config::ApiConfig;
use crate::{ApiError, ApiResult, ConfigError};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const ACCEPT: &str = "application/vnd.github+json";

/// Retry behaviour for a single logical request
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// HTTP exchanges attempted before giving up
    pub max_attempts: u32,

    /// Delay after a transport failure
    pub transient_backoff: Duration,

    /// Lower bound on the sleep after quota exhaustion
    pub min_rate_limit_sleep: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            transient_backoff: Duration::from_millis(config.transient_backoff_ms),
            min_rate_limit_sleep: Duration::from_secs(config.min_rate_limit_sleep_secs),
        }
    }

    /// Sleep before retrying a quota-exhausted request
    fn quota_sleep(&self, quota: Option<&RateQuota>, now_epoch: i64) -> Duration {
        let until_reset = quota
            .map(|q| Duration::from_secs(q.seconds_until_reset(now_epoch).max(0) as u64))
            .unwrap_or_default();
        until_reset.max(self.min_rate_limit_sleep)
    }
}

/// Builds the underlying HTTP client with auth and accept headers
fn build_http_client(config: &ApiConfig) -> Result<Client, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));

    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ConfigError::Validation("API token is not a valid header value".into()))?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
    }

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))
}

/// True for failures worth retrying after a short pause
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Outcome of one HTTP exchange
enum Attempt {
    Done(String),
    Retry(Duration),
}

/// GitHub REST client shared by every crawl strategy
pub struct ApiClient {
    http: Client,
    base_url: String,
    cache: ResponseCache,
    limiter: RateLimiter,
    retry: RetryPolicy,
    requests_sent: AtomicU64,
}

impl ApiClient {
    /// Creates a client for the configured API using `cache`
    pub fn new(config: &ApiConfig, cache: ResponseCache) -> crate::Result<Self> {
        let http = build_http_client(config)?;

        if config.token.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("No API token configured; requests will be heavily rate limited");
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache,
            limiter: RateLimiter::new(),
            retry: RetryPolicy::from_config(config),
            requests_sent: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Number of live HTTP exchanges performed so far
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// GETs an endpoint relative to the API base (e.g. `repos/acme/demo`)
    pub async fn get(&self, endpoint: &str) -> ApiResult<Value> {
        let endpoint = endpoint.trim_start_matches('/');
        self.fetch(&self.endpoint_url(endpoint), endpoint).await
    }

    /// Absolute URL of an endpoint, which is also its cache key
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Like [`get`](Self::get), decoding into `T`
    pub async fn get_as<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        let value = self.get(endpoint).await?;
        decode(endpoint, value)
    }

    /// GETs an absolute URL, which must lie under the API base
    pub async fn get_url(&self, url: &str) -> ApiResult<Value> {
        let endpoint = url
            .strip_prefix(&self.base_url)
            .filter(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
            .ok_or_else(|| ApiError::ForeignUrl(url.to_string()))?;
        self.fetch(url, endpoint).await
    }

    /// Like [`get_url`](Self::get_url), decoding into `T`
    pub async fn get_url_as<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let value = self.get_url(url).await?;
        decode(url, value)
    }

    async fn fetch(&self, url: &str, endpoint: &str) -> ApiResult<Value> {
        if let Some(body) = self.cache.lookup(url) {
            match serde_json::from_str(&body) {
                Ok(value) => {
                    tracing::trace!("Cache hit: {}", url);
                    return Ok(value);
                }
                Err(e) => tracing::warn!("Discarding unparseable cache entry for {}: {}", url, e),
            }
        }

        let class = classify_endpoint(endpoint);
        let mut attempts = 0u32;

        let body = loop {
            if attempts >= self.retry.max_attempts {
                return Err(ApiError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                });
            }
            attempts += 1;

            self.limiter.acquire(class).await;

            match self.attempt(url, class).await? {
                Attempt::Done(body) => break body,
                Attempt::Retry(wait) => tokio::time::sleep(wait).await,
            }
        };

        let value: Value = serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })?;

        self.cache.store(url, &body);
        Ok(value)
    }

    async fn attempt(&self, url: &str, class: RateClass) -> ApiResult<Attempt> {
        tracing::debug!("GET {}", url);
        self.requests_sent.fetch_add(1, Ordering::Relaxed);

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                tracing::warn!(
                    "Transport error for {}: {}; retrying in {:?}",
                    url,
                    e,
                    self.retry.transient_backoff
                );
                return Ok(Attempt::Retry(self.retry.transient_backoff));
            }
            Err(source) => {
                return Err(ApiError::Transport {
                    url: url.to_string(),
                    source,
                })
            }
        };

        let status = response.status();
        let quota = RateQuota::from_headers(response.headers());
        if let Some(quota) = &quota {
            self.limiter.reconcile(class, quota);
        }

        let exhausted = match status {
            StatusCode::FORBIDDEN => quota.as_ref().is_some_and(RateQuota::is_exhausted),
            StatusCode::TOO_MANY_REQUESTS => quota.as_ref().map_or(true, RateQuota::is_exhausted),
            _ => false,
        };

        if exhausted {
            let wait = self
                .retry
                .quota_sleep(quota.as_ref(), chrono::Utc::now().timestamp());
            tracing::warn!("Rate limit exceeded for {}; sleeping {:?}", class, wait);
            return Ok(Attempt::Retry(wait));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        match response.text().await {
            Ok(body) => Ok(Attempt::Done(body)),
            Err(e) if is_transient(&e) => {
                tracing::warn!("Failed reading body of {}: {}; retrying", url, e);
                Ok(Attempt::Retry(self.retry.transient_backoff))
            }
            Err(source) => Err(ApiError::Transport {
                url: url.to_string(),
                source,
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}

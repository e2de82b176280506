use chrono::Duration;
use serde::Deserialize;

/// Longest interval any hour- or day-valued setting may express (ten years)
pub const MAX_INTERVAL_HOURS: u64 = 24 * 3650;

/// Converts configured hours to a duration, capped at [`MAX_INTERVAL_HOURS`]
pub(crate) fn capped_hours(hours: u64) -> Duration {
    Duration::hours(hours.min(MAX_INTERVAL_HOURS) as i64)
}

/// Main configuration structure
///
/// Every section has defaults, so an empty file (or no file at all) yields a
/// runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
}

/// Remote API access configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Root of the REST API
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Host name of repository web URLs (e.g. `https://github.com/owner/name`)
    #[serde(rename = "web-host")]
    pub web_host: String,

    /// Bearer token; normally supplied through `GITHUB_API_TOKEN`
    pub token: Option<String>,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Lower bound on the sleep after quota exhaustion (seconds)
    #[serde(rename = "min-rate-limit-sleep-secs")]
    pub min_rate_limit_sleep_secs: u64,

    /// Fixed delay after a transport failure (milliseconds)
    #[serde(rename = "transient-backoff-ms")]
    pub transient_backoff_ms: u64,

    /// Maximum HTTP exchanges attempted for one request
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            web_host: "github.com".to_string(),
            token: None,
            user_agent: format!("trawl/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            min_rate_limit_sleep_secs: 60,
            transient_backoff_ms: 5_000,
            max_attempts: 12,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cached response is served instead of a live request (hours)
    #[serde(rename = "validity-hours")]
    pub validity_hours: u64,

    /// How long a cached row is kept before being purged (hours)
    #[serde(rename = "retention-hours")]
    pub retention_hours: u64,
}

impl CacheConfig {
    pub fn validity(&self) -> Duration {
        capped_hours(self.validity_hours)
    }

    pub fn retention(&self) -> Duration {
        capped_hours(self.retention_hours)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity_hours: 24,
            retention_hours: 24 * 7,
        }
    }
}

/// Discovery and re-scan configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Target file extension, without the leading dot
    pub extension: String,

    /// Canonical source repository (`owner/name`) excluded from code search
    #[serde(rename = "excluded-repo")]
    pub excluded_repo: Option<String>,

    /// Page size for paginated listings
    #[serde(rename = "per-page")]
    pub per_page: u32,

    /// Re-scan interval for repositories that had matches (hours)
    #[serde(rename = "active-rescan-hours")]
    pub active_rescan_hours: u64,

    /// Re-scan interval for repositories with zero matches (days)
    #[serde(rename = "idle-rescan-days")]
    pub idle_rescan_days: u64,

    /// Re-scan interval for repositories that were not found (days)
    #[serde(rename = "missing-rescan-days")]
    pub missing_rescan_days: u64,
}

impl CrawlerConfig {
    pub fn active_rescan(&self) -> Duration {
        capped_hours(self.active_rescan_hours)
    }

    pub fn idle_rescan(&self) -> Duration {
        capped_hours(self.idle_rescan_days.saturating_mul(24))
    }

    pub fn missing_rescan(&self) -> Duration {
        capped_hours(self.missing_rescan_days.saturating_mul(24))
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            extension: "roc".to_string(),
            excluded_repo: Some("roc-lang/roc".to_string()),
            per_page: 100,
            active_rescan_hours: 24,
            idle_rescan_days: 30,
            missing_rescan_days: 30,
        }
    }
}

/// Database locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the corpus SQLite database
    #[serde(rename = "corpus-path")]
    pub corpus_path: String,

    /// Path to the response cache SQLite database
    #[serde(rename = "cache-path")]
    pub cache_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            corpus_path: "corpus.db".to_string(),
            cache_path: "api_cache.db".to_string(),
        }
    }
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between crawl passes (seconds)
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
        }
    }
}

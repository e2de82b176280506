//! Trawl: an incremental source-file corpus crawler
//!
//! This crate discovers and re-fetches every file with a target extension
//! across a code-hosting platform's public repositories, driving a
//! rate-limited REST API through a persistent response cache and an adaptive
//! per-class token bucket.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Integrity check failed for {repo_url} {path}: {reason}")]
    Integrity {
        repo_url: String,
        path: String,
        reason: String,
    },

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),
}

/// Errors surfaced by the API client
///
/// Quota exhaustion never appears here: the client absorbs it by waiting.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Transport error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("URL is outside the API base: {0}")]
    ForeignUrl(String),
}

impl ApiError {
    /// Returns true if the remote resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// Re-export commonly used types
pub use api::{ApiClient, RateClass, RateLimiter, ResponseCache};
pub use config::Config;
pub use crawler::{CrawlEngine, PassSummary, ScanPolicy};
pub use storage::{SqliteStorage, Storage};
pub use worker::Worker;

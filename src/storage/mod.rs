//! Storage module for the persisted corpus
//!
//! This module owns the durable record of the crawl:
//! - Discovered files (append-only, full history)
//! - Per-repository scan history (append-only, latest row wins)
//! - Hidden markers written by the external viewer
//!
//! The response cache lives in [`crate::api::ResponseCache`] and shares the
//! timestamp helpers defined here.

pub(crate) mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Opens (creating if needed) the corpus database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Match count stored for a repository that no longer exists
pub const NOT_FOUND_SENTINEL: i64 = -1;

/// Result of one repository scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The repository was scanned and this many matching files were found
    Matched(u32),

    /// The repository lookup returned not-found
    NotFound,
}

impl ScanOutcome {
    pub fn to_db_value(&self) -> i64 {
        match self {
            Self::Matched(count) => i64::from(*count),
            Self::NotFound => NOT_FOUND_SENTINEL,
        }
    }

    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            NOT_FOUND_SENTINEL => Some(Self::NotFound),
            v => u32::try_from(v).ok().map(Self::Matched),
        }
    }

    /// Number of matching files, zero for a missing repository
    pub fn match_count(&self) -> u32 {
        match self {
            Self::Matched(count) => *count,
            Self::NotFound => 0,
        }
    }
}

/// A file row as stored in the corpus
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub id: i64,
    pub content_hash: String,
    pub commit_sha: String,
    pub retrieved_at: DateTime<Utc>,
    pub contents: String,
    pub repo_url: String,
    pub file_path: String,
}

/// A file about to be appended to the corpus
#[derive(Debug, Clone)]
pub struct NewDiscoveredFile {
    pub content_hash: String,
    pub commit_sha: String,
    pub retrieved_at: DateTime<Utc>,
    pub contents: String,
    pub repo_url: String,
    pub file_path: String,
}

/// One scan attempt for a repository
#[derive(Debug, Clone)]
pub struct RepoScanRecord {
    pub id: i64,
    pub repo_url: String,
    pub scanned_at: DateTime<Utc>,
    pub commit_sha: Option<String>,
    pub outcome: ScanOutcome,
}

/// A scan attempt about to be appended
#[derive(Debug, Clone)]
pub struct NewRepoScan {
    pub repo_url: String,
    pub scanned_at: DateTime<Utc>,
    pub commit_sha: Option<String>,
    pub outcome: ScanOutcome,
}

/// Formats a timestamp the way every table stores it
///
/// Fixed-width UTC so that text comparison in SQL orders chronologically.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
}

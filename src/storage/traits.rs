//! Storage traits and error types

use crate::storage::{DiscoveredFile, NewDiscoveredFile, NewRepoScan, RepoScanRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("File not found: {0}")]
    FileNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for corpus storage backends
///
/// Every write is a single-row statement so that each one is atomic on its
/// own; callers sharing a backend across threads wrap it in a mutex.
pub trait Storage {
    // ===== Discovered Files =====

    /// Appends a discovered file and returns its row ID
    ///
    /// Identical content is appended again; deduplication is left to readers.
    fn add_file(&mut self, file: &NewDiscoveredFile) -> StorageResult<i64>;

    /// Gets every file row recorded for a repository, oldest first
    fn files_for_repo(&self, repo_url: &str) -> StorageResult<Vec<DiscoveredFile>>;

    /// Gets the distinct repository URLs that have at least one file,
    /// excluding hidden repositories
    fn known_repo_urls(&self) -> StorageResult<Vec<String>>;

    // ===== Scan History =====

    /// Appends a scan record
    fn record_scan(&mut self, scan: &NewRepoScan) -> StorageResult<i64>;

    /// Gets the newest scan record for a repository
    fn latest_scan(&self, repo_url: &str) -> StorageResult<Option<RepoScanRecord>>;

    /// Gets every scan record for a repository, oldest first
    fn scans_for_repo(&self, repo_url: &str) -> StorageResult<Vec<RepoScanRecord>>;

    // ===== Hide Markers =====

    /// Marks a file row as hidden
    fn hide_file(&mut self, file_id: i64) -> StorageResult<()>;

    /// Marks a repository as hidden; hidden repositories are not crawled
    fn hide_repo(&mut self, repo_url: &str) -> StorageResult<()>;

    /// Clears a repository's hidden marker
    fn unhide_repo(&mut self, repo_url: &str) -> StorageResult<()>;

    /// Checks whether a repository is hidden
    fn is_repo_hidden(&self, repo_url: &str) -> StorageResult<bool>;

    // ===== Statistics =====

    /// Counts file rows
    fn count_files(&self) -> StorageResult<u64>;

    /// Sums the size of distinct (hash, contents) pairs
    fn distinct_content_bytes(&self) -> StorageResult<u64>;

    /// Counts file rows per retrieval day (`YYYY-MM-DD`), oldest first
    fn files_by_day(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Counts distinct repositories with at least one scan record
    fn count_scanned_repos(&self) -> StorageResult<u64>;

    /// Counts repositories whose latest scan found at least one file
    fn count_repos_with_matches(&self) -> StorageResult<u64>;

    /// Counts repositories whose latest scan returned not-found
    fn count_missing_repos(&self) -> StorageResult<u64>;
}

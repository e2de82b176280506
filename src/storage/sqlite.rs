//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, parse_timestamp, DiscoveredFile, NewDiscoveredFile, NewRepoScan,
    RepoScanRecord, ScanOutcome,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the corpus database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Checkpoints the write-ahead log and closes the connection
    pub fn close(self) -> StorageResult<()> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn outcome_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ScanOutcome> {
    let raw: i64 = row.get(idx)?;
    ScanOutcome::from_db_value(raw).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveredFile> {
    Ok(DiscoveredFile {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        commit_sha: row.get(2)?,
        retrieved_at: timestamp_at(row, 3)?,
        contents: row.get(4)?,
        repo_url: row.get(5)?,
        file_path: row.get(6)?,
    })
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<RepoScanRecord> {
    Ok(RepoScanRecord {
        id: row.get(0)?,
        repo_url: row.get(1)?,
        scanned_at: timestamp_at(row, 2)?,
        commit_sha: row.get(3)?,
        outcome: outcome_at(row, 4)?,
    })
}

/// Restricts `repo_scans s` to each repository's newest row
const LATEST_SCAN_FILTER: &str = "s.id = (
    SELECT s2.id FROM repo_scans s2
    WHERE s2.repo_url = s.repo_url
    ORDER BY s2.scanned_at DESC, s2.id DESC
    LIMIT 1
)";

impl Storage for SqliteStorage {
    // ===== Discovered Files =====

    fn add_file(&mut self, file: &NewDiscoveredFile) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO discovered_files
             (content_hash, commit_sha, retrieved_at, contents, repo_url, file_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.content_hash,
                file.commit_sha,
                format_timestamp(file.retrieved_at),
                file.contents,
                file.repo_url,
                file.file_path,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn files_for_repo(&self, repo_url: &str) -> StorageResult<Vec<DiscoveredFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content_hash, commit_sha, retrieved_at, contents, repo_url, file_path
             FROM discovered_files WHERE repo_url = ?1 ORDER BY id ASC",
        )?;

        let files = stmt
            .query_map(params![repo_url], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn known_repo_urls(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT repo_url FROM discovered_files
             WHERE repo_url NOT IN (SELECT repo_url FROM hidden_repos)
             ORDER BY repo_url",
        )?;

        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    // ===== Scan History =====

    fn record_scan(&mut self, scan: &NewRepoScan) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO repo_scans (repo_url, scanned_at, commit_sha, match_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                scan.repo_url,
                format_timestamp(scan.scanned_at),
                scan.commit_sha,
                scan.outcome.to_db_value(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_scan(&self, repo_url: &str) -> StorageResult<Option<RepoScanRecord>> {
        let scan = self
            .conn
            .query_row(
                "SELECT id, repo_url, scanned_at, commit_sha, match_count
                 FROM repo_scans WHERE repo_url = ?1
                 ORDER BY scanned_at DESC, id DESC LIMIT 1",
                params![repo_url],
                scan_from_row,
            )
            .optional()?;

        Ok(scan)
    }

    fn scans_for_repo(&self, repo_url: &str) -> StorageResult<Vec<RepoScanRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repo_url, scanned_at, commit_sha, match_count
             FROM repo_scans WHERE repo_url = ?1 ORDER BY scanned_at ASC, id ASC",
        )?;

        let scans = stmt
            .query_map(params![repo_url], scan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scans)
    }

    // ===== Hide Markers =====

    fn hide_file(&mut self, file_id: i64) -> StorageResult<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM discovered_files WHERE id = ?1)",
            params![file_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::FileNotFound(file_id));
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO hidden_files (file_id, hidden_at) VALUES (?1, ?2)",
            params![file_id, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    fn hide_repo(&mut self, repo_url: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO hidden_repos (repo_url, hidden_at) VALUES (?1, ?2)",
            params![repo_url, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    fn unhide_repo(&mut self, repo_url: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM hidden_repos WHERE repo_url = ?1",
            params![repo_url],
        )?;
        Ok(())
    }

    fn is_repo_hidden(&self, repo_url: &str) -> StorageResult<bool> {
        let hidden: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM hidden_repos WHERE repo_url = ?1)",
            params![repo_url],
            |row| row.get(0),
        )?;
        Ok(hidden)
    }

    // ===== Statistics =====

    fn count_files(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM discovered_files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn distinct_content_bytes(&self) -> StorageResult<u64> {
        let total: Option<i64> = self.conn.query_row(
            "SELECT SUM(LENGTH(contents)) FROM
             (SELECT DISTINCT content_hash, contents FROM discovered_files)",
            [],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0) as u64)
    }

    fn files_by_day(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT substr(retrieved_at, 1, 10) AS day, COUNT(*)
             FROM discovered_files GROUP BY day ORDER BY day",
        )?;

        let days = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(days)
    }

    fn count_scanned_repos(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT repo_url) FROM repo_scans",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_repos_with_matches(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM repo_scans s WHERE {} AND s.match_count > 0",
                LATEST_SCAN_FILTER
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_missing_repos(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM repo_scans s WHERE {} AND s.match_count = ?1",
                LATEST_SCAN_FILTER
            ),
            params![ScanOutcome::NotFound.to_db_value()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

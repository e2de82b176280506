//! Persistent response cache
//!
//! Responses are keyed by full request URL and served for a validity window.
//! Rows outlive that window until a purge removes them. Any cache failure is
//! logged and reported as a miss so that it never stalls the request pipeline.

use crate::storage::schema::initialize_cache_schema;
use crate::storage::{format_timestamp, parse_timestamp, StorageResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-backed response cache
pub struct ResponseCache {
    conn: Option<Mutex<Connection>>,
    validity: Duration,
}

impl ResponseCache {
    /// Opens or creates the cache database at `path`
    pub fn open(path: &Path, validity: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_cache_schema(&conn)?;

        Ok(Self {
            conn: Some(Mutex::new(conn)),
            validity,
        })
    }

    /// Creates an in-memory cache
    pub fn in_memory(validity: Duration) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_cache_schema(&conn)?;

        Ok(Self {
            conn: Some(Mutex::new(conn)),
            validity,
        })
    }

    /// Creates a cache that never hits and never stores
    pub fn disabled() -> Self {
        Self {
            conn: None,
            validity: Duration::zero(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    fn lock(&self) -> Option<MutexGuard<'_, Connection>> {
        self.conn
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the cached body for `url` if present and still valid
    pub fn lookup(&self, url: &str) -> Option<String> {
        self.lookup_at(url, Utc::now())
    }

    pub(crate) fn lookup_at(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let conn = self.lock()?;

        let row: Option<(String, String)> = match conn
            .query_row(
                "SELECT response, stored_at FROM api_cache WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", url, e);
                return None;
            }
        };

        let (body, stored_at) = row?;
        let stored_at = match parse_timestamp(&stored_at) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!("Ignoring cache row for {} with bad timestamp: {}", url, e);
                return None;
            }
        };

        if now - stored_at >= self.validity {
            tracing::trace!("Cache entry for {} expired", url);
            return None;
        }

        Some(body)
    }

    /// Stores `body` for `url`, replacing any existing row
    pub fn store(&self, url: &str, body: &str) {
        self.store_at(url, body, Utc::now());
    }

    pub(crate) fn store_at(&self, url: &str, body: &str, stored_at: DateTime<Utc>) {
        let Some(conn) = self.lock() else {
            return;
        };

        let result = conn.execute(
            "INSERT INTO api_cache (url, response, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET
                 response = excluded.response,
                 stored_at = excluded.stored_at",
            params![url, body, format_timestamp(stored_at)],
        );

        if let Err(e) = result {
            tracing::warn!("Cache write failed for {}: {}", url, e);
        }
    }

    /// Drops the row for `url` so the next lookup misses
    pub fn remove(&self, url: &str) {
        let Some(conn) = self.lock() else {
            return;
        };

        if let Err(e) = conn.execute("DELETE FROM api_cache WHERE url = ?1", params![url]) {
            tracing::warn!("Cache eviction failed for {}: {}", url, e);
        }
    }

    /// Deletes rows stored more than `retention` ago and returns how many
    pub fn purge_older_than(&self, retention: Duration) -> usize {
        self.purge_before(Utc::now() - retention)
    }

    pub(crate) fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let Some(conn) = self.lock() else {
            return 0;
        };

        match conn.execute(
            "DELETE FROM api_cache WHERE stored_at < ?1",
            params![format_timestamp(cutoff)],
        ) {
            Ok(purged) => purged,
            Err(e) => {
                tracing::warn!("Cache purge failed: {}", e);
                0
            }
        }
    }

    /// Number of rows currently held
    pub fn len(&self) -> usize {
        let Some(conn) = self.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM api_cache", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

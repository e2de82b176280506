//! Database schema definitions
//!
//! The corpus and the response cache may live in the same file or in two
//! files; each side creates only its own tables.

/// SQL schema for the corpus database
pub const CORPUS_SCHEMA_SQL: &str = r#"
-- Every ingested file, one row per ingestion
CREATE TABLE IF NOT EXISTS discovered_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    retrieved_at TEXT NOT NULL,
    contents TEXT NOT NULL,
    repo_url TEXT NOT NULL,
    file_path TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_repo ON discovered_files(repo_url);
CREATE INDEX IF NOT EXISTS idx_files_hash ON discovered_files(content_hash);

-- One row per scan attempt; the newest row is the repository's current state
CREATE TABLE IF NOT EXISTS repo_scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_url TEXT NOT NULL,
    scanned_at TEXT NOT NULL,
    commit_sha TEXT,
    match_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scans_repo_time ON repo_scans(repo_url, scanned_at);

-- Viewer-maintained hide markers
CREATE TABLE IF NOT EXISTS hidden_files (
    file_id INTEGER PRIMARY KEY,
    hidden_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hidden_repos (
    repo_url TEXT PRIMARY KEY,
    hidden_at TEXT NOT NULL
);
"#;

/// SQL schema for the response cache
pub const CACHE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS api_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    response TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_api_cache_stored ON api_cache(stored_at, url);
"#;

/// Initializes the corpus schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CORPUS_SCHEMA_SQL)?;
    Ok(())
}

/// Initializes the response cache schema
pub fn initialize_cache_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CACHE_SCHEMA_SQL)?;
    Ok(())
}

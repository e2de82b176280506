//! File ingestion
//!
//! Turns a tree entry or search hit into a [`NewDiscoveredFile`]. Fetched
//! blobs are checked against what the listing declared before anything is
//! stored. A blob that fails the check is evicted from the response cache so
//! the next pass refetches it.

use crate::api::types::{Blob, SearchItem, TreeEntry};
use crate::api::ApiClient;
use crate::storage::NewDiscoveredFile;
use crate::url::RepoRef;
use crate::{Result, TrawlError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the decoded file contents
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Decodes API base64, which is wrapped with newlines
pub fn decode_base64(content: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

/// What the listing says a blob should look like
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub sha: &'a str,
    pub size: Option<u64>,
}

/// Checks a fetched blob and returns its decoded bytes
///
/// The error is a human-readable reason for the mismatch.
pub fn verify_blob(expected: Expected<'_>, blob: &Blob) -> std::result::Result<Vec<u8>, String> {
    if blob.sha != expected.sha {
        return Err(format!(
            "sha mismatch: listed {}, fetched {}",
            expected.sha, blob.sha
        ));
    }

    if let Some(size) = expected.size {
        if blob.size != size {
            return Err(format!("size mismatch: listed {}, fetched {}", size, blob.size));
        }
    }

    if blob.encoding != "base64" {
        return Err(format!("unexpected encoding {:?}", blob.encoding));
    }

    let bytes = decode_base64(&blob.content).map_err(|e| format!("invalid base64: {}", e))?;
    if bytes.len() as u64 != blob.size {
        return Err(format!(
            "decoded {} bytes, blob declares {}",
            bytes.len(),
            blob.size
        ));
    }

    Ok(bytes)
}

fn integrity_error(repo_url: &str, path: &str, reason: String) -> TrawlError {
    TrawlError::Integrity {
        repo_url: repo_url.to_string(),
        path: path.to_string(),
        reason,
    }
}

/// Fetches and verifies the contents of a tree entry
///
/// Zero-size entries are not fetched.
pub async fn fetch_entry(
    api: &ApiClient,
    repo: &RepoRef,
    repo_url: &str,
    entry: &TreeEntry,
) -> Result<Vec<u8>> {
    if entry.size == Some(0) {
        return Ok(Vec::new());
    }

    let url = match entry
        .url
        .as_deref()
        .filter(|url| url.starts_with(api.base_url()))
    {
        Some(url) => url.to_string(),
        None => api.endpoint_url(&format!("{}/git/blobs/{}", repo.api_path(), entry.sha)),
    };
    let blob: Blob = api.get_url_as(&url).await?;

    let expected = Expected {
        sha: &entry.sha,
        size: entry.size,
    };
    verify_blob(expected, &blob).map_err(|reason| {
        api.cache().remove(&url);
        integrity_error(repo_url, &entry.path, reason)
    })
}

/// Fetches and verifies the contents behind a code-search hit
pub async fn fetch_search_hit(api: &ApiClient, item: &SearchItem) -> Result<Vec<u8>> {
    let blob: Blob = api.get_url_as(&item.url).await?;

    let expected = Expected {
        sha: &item.sha,
        size: None,
    };
    verify_blob(expected, &blob).map_err(|reason| {
        api.cache().remove(&item.url);
        integrity_error(&item.repository.html_url, &item.path, reason)
    })
}

/// Builds the corpus row for fetched contents
pub fn discovered_file(
    repo_url: &str,
    path: &str,
    commit_sha: &str,
    bytes: &[u8],
    retrieved_at: DateTime<Utc>,
) -> NewDiscoveredFile {
    NewDiscoveredFile {
        content_hash: content_hash(bytes),
        commit_sha: commit_sha.to_string(),
        retrieved_at,
        contents: String::from_utf8_lossy(bytes).into_owned(),
        repo_url: repo_url.to_string(),
        file_path: path.to_string(),
    }
}

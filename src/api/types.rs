//! Response shapes for the endpoints the crawler uses
//!
//! Only the fields the crawler reads are declared; everything else in the
//! payload is ignored.

use serde::Deserialize;

/// `GET /repos/{owner}/{name}`
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub default_branch: Option<String>,
    pub html_url: String,
}

/// `GET /repos/{owner}/{name}/branches/{branch}`
#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub commit: BranchCommit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

/// `GET /repos/{owner}/{name}/git/trees/{sha}?recursive=1`
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub sha: String,
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    pub size: Option<u64>,
    pub url: Option<String>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }

    /// True if the final path segment ends in `.{extension}`
    pub fn has_extension(&self, extension: &str) -> bool {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.strip_suffix(extension)
            .is_some_and(|stem| stem.ends_with('.'))
    }
}

/// `GET /repos/{owner}/{name}/git/blobs/{sha}`
#[derive(Debug, Clone, Deserialize)]
pub struct Blob {
    pub sha: String,
    pub size: u64,
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub content: String,
}

/// `GET /search/code`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub path: String,
    pub sha: String,
    pub url: String,
    pub repository: SearchRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRepository {
    pub full_name: String,
    pub html_url: String,
}

/// Entry of `GET /users/{user}/repos`
#[derive(Debug, Clone, Deserialize)]
pub struct UserRepo {
    pub full_name: String,
    pub html_url: String,
}

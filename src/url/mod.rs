//! Repository URL handling
//!
//! Repositories are identified in the corpus by their web URL
//! (`https://{host}/{owner}/{name}`). This module converts between that form
//! and the `owner/name` pair used in API paths, and builds the query strings
//! the crawler sends.

use crate::{Result, TrawlError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use url::{form_urlencoded, Url};

/// An `owner/name` repository reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses a repository web URL
    ///
    /// The host must match `web_host` (case-insensitive, `www.` ignored) and
    /// the path must be exactly `/{owner}/{name}`, optionally with a trailing
    /// slash or `.git` suffix.
    ///
    /// # Examples
    ///
    /// ```
    /// use trawl::url::RepoRef;
    ///
    /// let repo = RepoRef::from_web_url("https://github.com/acme/demo", "github.com").unwrap();
    /// assert_eq!(repo.full_name(), "acme/demo");
    /// ```
    pub fn from_web_url(repo_url: &str, web_host: &str) -> Result<Self> {
        let invalid = || TrawlError::InvalidRepoUrl(repo_url.to_string());

        let url = Url::parse(repo_url).map_err(|_| invalid())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid());
        }

        let host = url.host_str().map(normalize_host).ok_or_else(invalid)?;
        if host != normalize_host(web_host) {
            return Err(invalid());
        }

        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [owner, name] => {
                let name = name.strip_suffix(".git").unwrap_or(*name);
                if name.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::new(*owner, name))
            }
            _ => Err(invalid()),
        }
    }

    /// Parses an `owner/name` pair
    pub fn from_full_name(full_name: &str) -> Result<Self> {
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(TrawlError::InvalidRepoUrl(full_name.to_string())),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// The corpus key for this repository
    pub fn web_url(&self, web_host: &str) -> String {
        format!("https://{}/{}/{}", normalize_host(web_host), self.owner, self.name)
    }

    /// API path prefix, e.g. `repos/acme/demo`
    pub fn api_path(&self) -> String {
        format!("repos/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.to_lowercase();
    if let Some(rest) = host.strip_prefix("www.") {
        return rest.to_string();
    }
    host
}

/// Characters escaped in a branch name placed in a URL path
const BRANCH_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encodes a branch name for an API path
///
/// `/` is kept, so `feature/x` stays two segments as the API expects.
pub fn encode_branch(branch: &str) -> String {
    utf8_percent_encode(branch, BRANCH_PATH).to_string()
}

/// Reads the `ref` query parameter of an API URL
///
/// Code search results point at `.../contents/{path}?ref={commit}`.
pub fn ref_query_param(api_url: &str) -> Option<String> {
    let url = Url::parse(api_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "ref")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Builds a `key=value&...` query string with form encoding
pub fn encode_query<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, &value);
    }
    serializer.finish()
}

/// Code-search qualifier string for files with `extension`
pub fn code_search_query(extension: &str, excluded_repo: Option<&str>) -> String {
    let mut query = format!("extension:{}", extension);
    if let Some(repo) = excluded_repo.filter(|r| !r.is_empty()) {
        query.push_str(&format!(" -repo:{}", repo));
    }
    query
}

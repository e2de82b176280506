//! Crawl pass orchestration
//!
//! A pass runs three discovery strategies in order:
//!
//! 1. Code search for files with the target extension
//! 2. Re-scan of every repository already in the corpus
//! 3. Expansion to every public repository of every known owner
//!
//! Strategies 2 and 3 drive the per-repository scan in
//! [`CrawlEngine::scan_repository`]. A repository is scanned at most once per
//! pass, so one that fails verification is not retried by a later strategy.
//! Everything runs sequentially; each store write is its own atomic row
//! insert, so an aborted pass leaves every completed repository intact.

use crate::api::types::{Branch, RepoInfo, SearchPage, Tree, UserRepo};
use crate::api::ApiClient;
use crate::config::{Config, CrawlerConfig};
use crate::crawler::ingest::{discovered_file, fetch_entry, fetch_search_hit};
use crate::crawler::policy::ScanPolicy;
use crate::storage::{NewRepoScan, RepoScanRecord, ScanOutcome, SqliteStorage, Storage};
use crate::url::{code_search_query, encode_branch, encode_query, ref_query_param, RepoRef};
use crate::{ApiError, Result, TrawlError};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Code search never returns results past this offset
const SEARCH_RESULT_CEILING: u64 = 1000;

/// What happened to one repository during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoScanStatus {
    /// Hidden by an operator; not touched
    Hidden,

    /// Scanned recently enough that no request was made
    NotDue,

    /// Repository lookup returned not-found; sentinel recorded
    Missing,

    /// Head commit matched the last scan; no tree fetched
    Unchanged,

    /// Tree fetched and this many matching files ingested
    Ingested(u32),

    /// A blob failed verification; ingestion stopped and no scan was recorded
    IntegrityFailure,
}

/// Counters for one crawl pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub search_hits: u64,
    pub files_ingested: u64,
    pub repos_scanned: u64,
    pub repos_unchanged: u64,
    pub repos_not_due: u64,
    pub repos_missing: u64,
    pub repos_hidden: u64,
    pub integrity_failures: u64,
}

impl PassSummary {
    fn record(&mut self, status: RepoScanStatus) {
        match status {
            RepoScanStatus::Hidden => self.repos_hidden += 1,
            RepoScanStatus::NotDue => self.repos_not_due += 1,
            RepoScanStatus::Missing => self.repos_missing += 1,
            RepoScanStatus::Unchanged => self.repos_unchanged += 1,
            RepoScanStatus::Ingested(count) => {
                self.repos_scanned += 1;
                self.files_ingested += u64::from(count);
            }
            RepoScanStatus::IntegrityFailure => self.integrity_failures += 1,
        }
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files ingested ({} via search), {} repos scanned, {} unchanged, {} not due, \
             {} missing, {} hidden, {} integrity failures",
            self.files_ingested + self.search_hits,
            self.search_hits,
            self.repos_scanned,
            self.repos_unchanged,
            self.repos_not_due,
            self.repos_missing,
            self.repos_hidden,
            self.integrity_failures
        )
    }
}

/// State carried through the strategies of one pass
#[derive(Debug, Default)]
pub struct CrawlPass {
    pub summary: PassSummary,

    /// Repository URLs already handed to the per-repository scan
    visited: HashSet<String>,
}

impl CrawlPass {
    pub fn into_summary(self) -> PassSummary {
        self.summary
    }

    /// Returns true if `repo_url` was already scanned in this pass
    pub fn has_visited(&self, repo_url: &str) -> bool {
        self.visited.contains(repo_url)
    }
}

/// Runs crawl passes against one API client and one corpus
pub struct CrawlEngine {
    api: Arc<ApiClient>,
    store: Arc<Mutex<SqliteStorage>>,
    crawler: CrawlerConfig,
    web_host: String,
    policy: ScanPolicy,
}

impl CrawlEngine {
    pub fn new(api: Arc<ApiClient>, store: Arc<Mutex<SqliteStorage>>, config: &Config) -> Self {
        let mut crawler = config.crawler.clone();
        crawler.extension = crawler.extension.trim_start_matches('.').to_string();

        Self {
            api,
            store,
            crawler,
            web_host: config.api.web_host.clone(),
            policy: ScanPolicy::from_config(&config.crawler),
        }
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn store(&self) -> MutexGuard<'_, SqliteStorage> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs all three strategies once
    ///
    /// Any error other than not-found or an integrity mismatch aborts the
    /// pass; writes already made are kept.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let mut pass = CrawlPass::default();

        tracing::info!("Strategy 1/3: code search for .{} files", self.crawler.extension);
        self.discover_via_search(&mut pass).await?;

        tracing::info!("Strategy 2/3: re-scanning known repositories");
        self.rescan_known_repos(&mut pass).await?;

        tracing::info!("Strategy 3/3: expanding known users");
        self.expand_known_users(&mut pass).await?;

        Ok(pass.into_summary())
    }

    /// Ingests every code-search hit for the target extension
    pub async fn discover_via_search(&self, pass: &mut CrawlPass) -> Result<()> {
        let summary = &mut pass.summary;
        let per_page = u64::from(self.crawler.per_page.max(1));
        let query = code_search_query(
            &self.crawler.extension,
            self.crawler.excluded_repo.as_deref(),
        );

        let mut page = 1u64;
        loop {
            let endpoint = format!(
                "search/code?{}",
                encode_query([
                    ("q", query.clone()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ])
            );
            let results: SearchPage = self.api.get_as(&endpoint).await?;
            tracing::debug!(
                "Search page {}: {} items of {}",
                page,
                results.items.len(),
                results.total_count
            );

            for item in &results.items {
                let repo = match RepoRef::from_full_name(&item.repository.full_name) {
                    Ok(repo) => repo,
                    Err(e) => {
                        tracing::warn!("Skipping search hit {}: {}", item.path, e);
                        continue;
                    }
                };
                let repo_url = repo.web_url(&self.web_host);

                if self.store().is_repo_hidden(&repo_url)? {
                    continue;
                }

                let bytes = match fetch_search_hit(&self.api, item).await {
                    Ok(bytes) => bytes,
                    Err(TrawlError::Integrity { reason, .. }) => {
                        tracing::warn!("Rejected search hit {} {}: {}", repo, item.path, reason);
                        summary.integrity_failures += 1;
                        continue;
                    }
                    Err(TrawlError::Api(ApiError::NotFound { .. })) => {
                        tracing::warn!("Search hit {} {} no longer exists", repo, item.path);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let commit = ref_query_param(&item.url).unwrap_or_else(|| item.sha.clone());
                let file = discovered_file(&repo_url, &item.path, &commit, &bytes, Utc::now());
                self.store().add_file(&file)?;
                summary.search_hits += 1;
            }

            let fetched = page * per_page;
            if (results.items.len() as u64) < per_page
                || fetched >= results.total_count
                || fetched >= SEARCH_RESULT_CEILING
            {
                break;
            }
            page += 1;
        }

        tracing::info!("Code search ingested {} files", summary.search_hits);
        Ok(())
    }

    /// Runs the per-repository scan over every repository in the corpus
    pub async fn rescan_known_repos(&self, pass: &mut CrawlPass) -> Result<()> {
        let known = self.store().known_repo_urls()?;
        tracing::info!("{} known repositories", known.len());

        for repo_url in known {
            let repo = match RepoRef::from_web_url(&repo_url, &self.web_host) {
                Ok(repo) => repo,
                Err(e) => {
                    tracing::warn!("Skipping stored repository: {}", e);
                    continue;
                }
            };
            self.scan_once(&repo, pass).await?;
        }

        Ok(())
    }

    /// Scans every public repository owned by a known repository's owner
    pub async fn expand_known_users(&self, pass: &mut CrawlPass) -> Result<()> {
        let owners: BTreeSet<String> = self
            .store()
            .known_repo_urls()?
            .iter()
            .filter_map(|url| RepoRef::from_web_url(url, &self.web_host).ok())
            .map(|repo| repo.owner)
            .collect();
        tracing::info!("{} known users", owners.len());

        for owner in owners {
            let repos = match self.list_user_repos(&owner).await {
                Ok(repos) => repos,
                Err(TrawlError::Api(ApiError::NotFound { .. })) => {
                    tracing::warn!("User {} not found", owner);
                    continue;
                }
                Err(e) => return Err(e),
            };

            for listed in repos {
                let repo = match RepoRef::from_full_name(&listed.full_name) {
                    Ok(repo) => repo,
                    Err(e) => {
                        tracing::warn!("Skipping listed repository: {}", e);
                        continue;
                    }
                };
                self.scan_once(&repo, pass).await?;
            }
        }

        Ok(())
    }

    async fn list_user_repos(&self, owner: &str) -> Result<Vec<UserRepo>> {
        let per_page = self.crawler.per_page.max(1) as usize;
        let mut repos = Vec::new();

        for page in 1u32.. {
            let endpoint = format!(
                "users/{}/repos?{}",
                owner,
                encode_query([("per_page", per_page.to_string()), ("page", page.to_string())])
            );
            let batch: Vec<UserRepo> = self.api.get_as(&endpoint).await?;
            let done = batch.len() < per_page;
            repos.extend(batch);
            if done {
                break;
            }
        }

        Ok(repos)
    }

    /// Scans `repo` unless this pass already did
    async fn scan_once(&self, repo: &RepoRef, pass: &mut CrawlPass) -> Result<()> {
        if !pass.visited.insert(repo.web_url(&self.web_host)) {
            tracing::debug!("{} already handled this pass", repo);
            return Ok(());
        }

        let status = self.scan_repository(repo).await?;
        pass.summary.record(status);
        Ok(())
    }

    /// Scans one repository if it is due
    pub async fn scan_repository(&self, repo: &RepoRef) -> Result<RepoScanStatus> {
        let repo_url = repo.web_url(&self.web_host);

        if self.store().is_repo_hidden(&repo_url)? {
            tracing::debug!("{} is hidden", repo);
            return Ok(RepoScanStatus::Hidden);
        }

        let last = self.store().latest_scan(&repo_url)?;
        if !self.policy.is_due(last.as_ref(), Utc::now()) {
            tracing::debug!("{} is not due", repo);
            return Ok(RepoScanStatus::NotDue);
        }

        tracing::info!("Scanning {}", repo);

        let info: RepoInfo = match self.api.get_as(&repo.api_path()).await {
            Ok(info) => info,
            Err(ApiError::NotFound { .. }) => {
                tracing::info!("{} not found", repo);
                self.record(&repo_url, None, ScanOutcome::NotFound)?;
                return Ok(RepoScanStatus::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(commit) = self.head_commit(repo, &info).await? else {
            tracing::info!("{} has no commits", repo);
            self.record(&repo_url, None, ScanOutcome::Matched(0))?;
            return Ok(RepoScanStatus::Ingested(0));
        };

        if let Some(previous) = unchanged_since(last.as_ref(), &commit) {
            tracing::debug!("{} unchanged at {}", repo, commit);
            self.record(&repo_url, Some(&commit), previous)?;
            return Ok(RepoScanStatus::Unchanged);
        }

        let tree: Tree = self
            .api
            .get_as(&format!("{}/git/trees/{}?recursive=1", repo.api_path(), commit))
            .await?;
        if tree.truncated {
            tracing::warn!("Tree listing for {} is truncated", repo);
        }

        let mut ingested = 0u32;
        for entry in tree
            .tree
            .iter()
            .filter(|e| e.is_blob() && e.has_extension(&self.crawler.extension))
        {
            let bytes = match fetch_entry(&self.api, repo, &repo_url, entry).await {
                Ok(bytes) => bytes,
                Err(TrawlError::Integrity { path, reason, .. }) => {
                    tracing::warn!(
                        "Integrity check failed for {} {}: {}; halting repository",
                        repo,
                        path,
                        reason
                    );
                    return Ok(RepoScanStatus::IntegrityFailure);
                }
                Err(e) => return Err(e),
            };

            let file = discovered_file(&repo_url, &entry.path, &commit, &bytes, Utc::now());
            self.store().add_file(&file)?;
            ingested += 1;
        }

        self.record(&repo_url, Some(&commit), ScanOutcome::Matched(ingested))?;
        tracing::info!("{} at {}: {} files", repo, commit, ingested);
        Ok(RepoScanStatus::Ingested(ingested))
    }

    /// Resolves the default branch to its head commit
    ///
    /// Returns `None` for a repository without a default branch or whose
    /// branch does not resolve (an empty repository).
    async fn head_commit(&self, repo: &RepoRef, info: &RepoInfo) -> Result<Option<String>> {
        let Some(branch) = info.default_branch.as_deref() else {
            return Ok(None);
        };

        let endpoint = format!("{}/branches/{}", repo.api_path(), encode_branch(branch));
        match self.api.get_as::<Branch>(&endpoint).await {
            Ok(branch) => Ok(Some(branch.commit.sha)),
            Err(ApiError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record(&self, repo_url: &str, commit: Option<&str>, outcome: ScanOutcome) -> Result<()> {
        self.store().record_scan(&NewRepoScan {
            repo_url: repo_url.to_string(),
            scanned_at: Utc::now(),
            commit_sha: commit.map(str::to_string),
            outcome,
        })?;
        Ok(())
    }
}

/// Previous outcome if the last scan already covered `commit`
fn unchanged_since(last: Option<&RepoScanRecord>, commit: &str) -> Option<ScanOutcome> {
    last.filter(|scan| scan.commit_sha.as_deref() == Some(commit))
        .map(|scan| scan.outcome)
}

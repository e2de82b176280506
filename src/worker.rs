//! Long-running worker loop
//!
//! Each cycle purges expired cache rows, runs one crawl pass and sleeps for
//! the configured interval. A failed pass is logged and retried next cycle.
//! Ctrl-C is honoured between passes only.

use crate::api::{ApiClient, ResponseCache};
use crate::config::Config;
use crate::crawler::{CrawlEngine, PassSummary};
use crate::storage::{open_storage, SqliteStorage};
use crate::Result;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Owns the process-wide context: store handle, API client and engine
pub struct Worker {
    engine: CrawlEngine,
    store: Arc<Mutex<SqliteStorage>>,
    interval: Duration,
    cache_retention: chrono::Duration,
}

/// Opens the response cache, falling back to no caching on failure
fn open_cache(config: &Config) -> ResponseCache {
    let path = Path::new(&config.storage.cache_path);

    match ResponseCache::open(path, config.cache.validity()) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(
                "Failed to open response cache {}: {}; running without cache",
                path.display(),
                e
            );
            ResponseCache::disabled()
        }
    }
}

impl Worker {
    /// Builds the worker from configuration, opening both databases
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = open_storage(Path::new(&config.storage.corpus_path))?;
        let api = ApiClient::new(&config.api, open_cache(config))?;
        Ok(Self::new(Arc::new(api), Arc::new(Mutex::new(store)), config))
    }

    pub fn new(api: Arc<ApiClient>, store: Arc<Mutex<SqliteStorage>>, config: &Config) -> Self {
        Self {
            engine: CrawlEngine::new(api, Arc::clone(&store), config),
            store,
            interval: Duration::from_secs(config.worker.interval_secs),
            cache_retention: config.cache.retention(),
        }
    }

    pub fn engine(&self) -> &CrawlEngine {
        &self.engine
    }

    /// Purges the cache and runs a single pass
    pub async fn run_cycle(&self) -> Result<PassSummary> {
        let purged = self
            .engine
            .api()
            .cache()
            .purge_older_than(self.cache_retention);
        if purged > 0 {
            tracing::info!("Purged {} expired cache rows", purged);
        }

        let requests_before = self.engine.api().requests_sent();
        let summary = self.engine.run_pass().await?;
        tracing::info!(
            "Pass complete: {} ({} API requests)",
            summary,
            self.engine.api().requests_sent() - requests_before
        );

        Ok(summary)
    }

    /// Runs cycles until interrupted, or a single cycle with `once`
    ///
    /// In `once` mode a failed pass is returned as an error; otherwise it is
    /// logged and the loop continues. The store is closed on the way out.
    pub async fn run(self, once: bool) -> Result<()> {
        loop {
            let result = self.run_cycle().await;
            match result {
                Ok(_) => {}
                Err(e) if once => {
                    tracing::error!("Crawl pass failed: {}", e);
                    self.shutdown()?;
                    return Err(e);
                }
                Err(e) => tracing::error!("Crawl pass failed: {}", e),
            }

            if once {
                break;
            }

            tracing::info!("Sleeping {:?} until next pass", self.interval);
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        self.shutdown()
    }

    fn shutdown(self) -> Result<()> {
        let Self { engine, store, .. } = self;
        drop(engine);

        match Arc::try_unwrap(store) {
            Ok(store) => {
                store
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .close()?;
                tracing::debug!("Corpus store closed");
            }
            Err(_) => tracing::warn!("Corpus store still shared at shutdown; leaving it open"),
        }

        Ok(())
    }
}

//! Trawl main entry point
//!
//! With no arguments, runs the crawl worker forever.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use trawl::config::{load_config, Config};
use trawl::output::{load_statistics, print_statistics};
use trawl::storage::SqliteStorage;
use trawl::Worker;
use tracing_subscriber::EnvFilter;

/// Trawl: an incremental source-file corpus crawler
///
/// Discovers repositories containing files with the configured extension
/// and keeps a local corpus of those files up to date, staying within the
/// API's rate limits.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "An incremental source-file corpus crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run a single crawl pass and exit
    #[arg(long, conflicts_with = "stats")]
    once: bool,

    /// Show statistics from the corpus database and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    match &cli.config {
        Some(path) => tracing::info!("Configuration loaded from {}", path.display()),
        None => tracing::info!("No configuration file given, using defaults"),
    }

    if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, cli.once).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawl=info,warn"),
            1 => EnvFilter::new("trawl=debug,info"),
            2 => EnvFilter::new("trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.corpus_path);

    let storage = SqliteStorage::new(Path::new(&config.storage.corpus_path))
        .context("Failed to open corpus database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    storage.close()?;
    Ok(())
}

/// Runs the worker loop
async fn handle_crawl(config: &Config, once: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling .{} files via {} (corpus: {}, cache: {})",
        config.crawler.extension,
        config.api.base_url,
        config.storage.corpus_path,
        config.storage.cache_path
    );

    let worker = Worker::from_config(config).context("Failed to start worker")?;
    worker.run(once).await?;

    tracing::info!("Worker stopped");
    Ok(())
}

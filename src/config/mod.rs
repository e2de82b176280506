//! Configuration module
//!
//! Configuration comes from an optional TOML file, then environment
//! overrides, then validation.
//!
//! # Example
//!
//! ```no_run
//! use trawl::config::load_config;
//!
//! let config = load_config(None).unwrap();
//! println!("Searching for .{} files", config.crawler.extension);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    ApiConfig, CacheConfig, Config, CrawlerConfig, StorageConfig, WorkerConfig, MAX_INTERVAL_HOURS,
};

pub use parser::{apply_env_overrides, load_config, parse_config};
pub use validation::validate;

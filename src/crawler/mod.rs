//! Crawl engine
//!
//! - Discovery strategies and per-repository scanning ([`CrawlEngine`])
//! - Re-scan cadence ([`ScanPolicy`])
//! - Blob fetching, verification and row building ([`ingest`])

mod engine;
pub mod ingest;
mod policy;

pub use engine::{CrawlEngine, CrawlPass, PassSummary, RepoScanStatus};
pub use policy::ScanPolicy;

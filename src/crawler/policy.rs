//! Re-scan cadence
//!
//! | Latest scan            | Due again after |
//! |------------------------|-----------------|
//! | none                   | immediately     |
//! | found ≥ 1 file         | `active`        |
//! | found 0 files          | `idle`          |
//! | repository not found   | `missing`       |

use crate::config::CrawlerConfig;
use crate::storage::{RepoScanRecord, ScanOutcome};
use chrono::{DateTime, Duration, Utc};

/// Decides whether a repository should be scanned this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    pub active: Duration,
    pub idle: Duration,
    pub missing: Duration,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            active: Duration::hours(24),
            idle: Duration::days(30),
            missing: Duration::days(30),
        }
    }
}

impl ScanPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            active: config.active_rescan(),
            idle: config.idle_rescan(),
            missing: config.missing_rescan(),
        }
    }

    /// Interval that must elapse after a scan with this outcome
    pub fn interval_for(&self, outcome: ScanOutcome) -> Duration {
        match outcome {
            ScanOutcome::Matched(0) => self.idle,
            ScanOutcome::Matched(_) => self.active,
            ScanOutcome::NotFound => self.missing,
        }
    }

    pub fn is_due(&self, last: Option<&RepoScanRecord>, now: DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(scan) => now - scan.scanned_at >= self.interval_for(scan.outcome),
        }
    }
}

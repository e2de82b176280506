//! Corpus statistics
//!
//! Aggregate counts read from the corpus store, printed by `--stats`.

use crate::storage::{Storage, StorageResult};

/// Corpus statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStatistics {
    /// Total number of file rows, including repeated fetches
    pub total_files: u64,

    /// Bytes of distinct contents
    pub distinct_bytes: u64,

    /// File rows per retrieval day, oldest first
    pub files_by_day: Vec<(String, u64)>,

    /// Repositories with at least one scan
    pub scanned_repos: u64,

    /// Repositories whose latest scan found files
    pub repos_with_matches: u64,

    /// Repositories whose latest scan returned not-found
    pub missing_repos: u64,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CorpusStatistics> {
    Ok(CorpusStatistics {
        total_files: storage.count_files()?,
        distinct_bytes: storage.distinct_content_bytes()?,
        files_by_day: storage.files_by_day()?,
        scanned_repos: storage.count_scanned_repos()?,
        repos_with_matches: storage.count_repos_with_matches()?,
        missing_repos: storage.count_missing_repos()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CorpusStatistics) {
    println!("=== Corpus Statistics ===\n");

    println!("Files:");
    println!("  Total rows: {}", stats.total_files);
    println!("  Distinct content: {}", format_bytes(stats.distinct_bytes));
    println!();

    println!("Repositories:");
    println!("  Scanned: {}", stats.scanned_repos);
    println!("  With matches: {}", stats.repos_with_matches);
    println!("  Missing: {}", stats.missing_repos);
    println!();

    if !stats.files_by_day.is_empty() {
        println!("Files by Day:");
        for (day, count) in &stats.files_by_day {
            println!("  {}: {}", day, count);
        }
        println!();
    }

    let hit_rate = if stats.scanned_repos > 0 {
        (stats.repos_with_matches as f64 / stats.scanned_repos as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Match Rate: {:.1}% ({} / {} repositories contain matching files)",
        hit_rate, stats.repos_with_matches, stats.scanned_repos
    );
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

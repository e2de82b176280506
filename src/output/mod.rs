//! Output module for reporting on the corpus

pub mod stats;

pub use stats::{load_statistics, print_statistics, CorpusStatistics};

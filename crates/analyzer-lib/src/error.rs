//! Error types for the analysis engine

use thiserror::Error;

/// Errors surfaced by ingestion, configuration and the analysis pipeline.
///
/// Missing performance data and missing SLA configuration are fatal; the
/// engine never substitutes defaults for either.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No usable request-level samples were supplied
    #[error("no usable request samples in input")]
    NoSamples,

    /// Too large a share of input rows could not be parsed
    #[error("{malformed} of {total} result rows are malformed (limit {pct:.0}%)", pct = .max_ratio * 100.0)]
    TooManyMalformedRows {
        malformed: usize,
        total: usize,
        max_ratio: f64,
    },

    /// Sample timestamps span more buckets than the configured cap
    #[error("samples span {count} buckets, more than the limit of {max}")]
    TooManyBuckets { count: usize, max: usize },

    /// SLA resolver had no entry and no default for a scope
    #[error("no SLA configured for scope '{0}'")]
    MissingSla(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration source could not be read or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Filesystem error while reading inputs or baselines
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Input file structure could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// A scope analysis task panicked or was cancelled
    #[error("scope analysis task failed: {0}")]
    Task(String),

    /// Stored baseline snapshot is missing or unreadable
    #[error("baseline store error: {0}")]
    BaselineStore(String),

    /// Stored baseline snapshot failed checksum validation
    #[error("checksum mismatch for baseline '{run_id}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        run_id: String,
        expected: String,
        actual: String,
    },
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::Parse(err.to_string())
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(err: csv::Error) -> Self {
        AnalysisError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

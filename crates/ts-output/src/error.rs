//! Error types for ts-output.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown log type {0:?}")]
    UnknownLogType(String),

    #[error("{path}:{line}: {source}")]
    BadRecord {
        path:   String,
        line:   usize,
        source: serde_json::Error,
    },
}

/// Alias for `Result<T, OutputError>`.
pub type OutputResult<T> = Result<T, OutputError>;

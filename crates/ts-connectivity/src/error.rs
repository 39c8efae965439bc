use thiserror::Error;

use ts_core::TsError;

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("connectivity configuration error: {0}")]
    Config(String),

    #[error("trace parse error at line {line}: {msg}")]
    Trace { line: usize, msg: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] TsError),
}

pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

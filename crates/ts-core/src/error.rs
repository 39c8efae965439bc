//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `TsError` as one
//! variant via `#[from]`.

use thiserror::Error;

use crate::MoteId;

/// The top-level error type for `ts-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum TsError {
    #[error("mote {0} not found")]
    MoteNotFound(MoteId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for all `ts-*` crates.
pub type TsResult<T> = Result<T, TsError>;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Lease store busy: lock on {path} not acquired within {waited_ms}ms")]
    StoreBusy { path: PathBuf, waited_ms: u64 },

    #[error("Lease store unavailable: {context}: {source}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Lease store corrupted: {path}: {detail}")]
    Corrupted { path: PathBuf, detail: String },

    #[error("Task source error: {0}")]
    TaskSource(String),

    #[error("Agent mail error: {0}")]
    Mail(String),
}

impl CoordError {
    /// Wrap an I/O failure with a short description of the attempted operation.
    pub fn unavailable(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::StoreUnavailable {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordError>;

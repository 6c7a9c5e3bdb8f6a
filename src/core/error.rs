use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode {format} data: {message}")]
    Decode { format: String, message: String },

    #[error("Failed to encode {format} data: {message}")]
    Encode { format: String, message: String },

    #[error("Lock error: {0}")]
    LockAcquisition(String),

    #[error("Lock release error: {0}")]
    LockRelease(String),

    #[error("Timed out after {timeout:?} waiting for lock on '{}'", .path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("Lock on '{}' released without being held", .0.display())]
    LockNotHeld(PathBuf),

    #[error("No snapshot to restore from")]
    NoSnapshot,

    #[error("Transaction already open on '{}'", .0.display())]
    NestedTransaction(PathBuf),

    #[error("No open transaction on '{}'", .0.display())]
    NoTransaction(PathBuf),

    #[error("Unknown format '{0}'")]
    UnknownFormat(String),

    #[error("Value conversion error: {0}")]
    Value(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn decode(format: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format: format.to_string(),
            message: err.to_string(),
        }
    }

    pub fn encode(format: &str, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format: format.to_string(),
            message: err.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockAcquisition(err.to_string())
    }
}

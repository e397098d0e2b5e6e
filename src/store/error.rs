//! Snapshot store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the snapshot store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A columnar file does not sit at `YYYY/MM/DD.parquet` under the raw root.
    /// Indicates store corruption; never treated as a per-date gap.
    #[error("Structural path violation at {path:?}: {reason}")]
    StructuralPath { path: PathBuf, reason: String },

    /// Domain name cannot be used as an output directory
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

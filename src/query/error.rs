//! Query error types
//!
//! Everything here is a hard failure: the logical table or an output shard
//! cannot be trusted, so errors surface to the caller.

use thiserror::Error;

/// Errors that can occur during query construction and execution
#[derive(Error, Debug)]
pub enum QueryError {
    /// Store layer error (including structural path violations)
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Embedded engine rejected or failed a statement
    #[error("Engine error: {0}")]
    Engine(#[from] duckdb::Error),

    /// I/O operation failed while committing a shard
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid year span
    #[error("Invalid year range: {start}..={end}")]
    InvalidYearRange { start: i32, end: i32 },
}

impl QueryError {
    /// True if the lake layout itself is corrupt
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            QueryError::Store(crate::store::StoreError::StructuralPath { .. })
        )
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

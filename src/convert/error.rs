//! Conversion error types

use thiserror::Error;

/// Errors that can occur while converting one raw snapshot
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A record does not fit the `(rank: i32, domain: text)` schema
    #[error("Schema violation at line {line}: {reason}")]
    SchemaViolation { line: usize, reason: String },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader could not be opened
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Record batch construction failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet encoding failed
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// Result type alias for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::SchemaViolation {
            line: 7,
            reason: "expected 2 fields (rank, domain), found 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Schema violation at line 7: expected 2 fields (rank, domain), found 3"
        );
    }
}

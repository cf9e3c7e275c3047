//! Error types for queue store operations.

use std::io;
use thiserror::Error;

/// Result type for queue store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during queue store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The journal is corrupted before its final record.
    #[error("journal corrupted at line {line}: {reason}")]
    Corrupted {
        /// 1-based line number of the bad record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// No queued operation has the given id.
    #[error("operation not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::NotFound("op-1".into());
        assert_eq!(err.to_string(), "operation not found: op-1");

        let err = StoreError::Corrupted {
            line: 3,
            reason: "expected value".into(),
        };
        assert_eq!(
            err.to_string(),
            "journal corrupted at line 3: expected value"
        );
    }
}

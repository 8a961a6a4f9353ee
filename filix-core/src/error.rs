//! Structured error types for the filix workspace.

use thiserror::Error;

/// Unified error type for all filix operations.
#[derive(Debug, Error)]
pub enum FilixError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed input data)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values, empty joins)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Numerical failure (NaN posterior, collapsed proposal window)
    #[error("numerical error: {0}")]
    Numeric(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the filix workspace.
pub type Result<T> = std::result::Result<T, FilixError>;

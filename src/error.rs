//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Undefined numeric results (zero-variance correlations, unresolved test
//! alternatives) are not errors: they are written as the `-2` sentinel at the
//! affected output position and the batch carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for diffcorr operations
#[derive(Error, Debug)]
pub enum DiffCorrError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (worker count, mismatched index arrays, out-of-range indices)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid data errors (ragged tables, non-numeric cells)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Parse errors
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The interrupt flag was raised; no partial output is returned
    #[error("Cancelled before bootstrap round {round}")]
    Cancelled { round: usize },

    /// Worker pool construction failed
    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },
}

/// Type alias for Results using DiffCorrError
pub type Result<T> = std::result::Result<T, DiffCorrError>;

impl DiffCorrError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for DiffCorrError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool {
            message: err.to_string(),
        }
    }
}

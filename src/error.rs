//! Error types for model loading and field calculation

use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading coefficient files or computing the field.
///
/// Numerically degenerate geometry (poles, vanishing horizontal field) is not
/// an error; it surfaces as `NaN` in the affected angles instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("file is locked by another process: {}", .0.display())]
    FileLocked(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported coefficient format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("epoch ending at line {line} has {count} coefficients, expected n(n+2)")]
    BadCoefficientCount { line: usize, count: usize },

    #[error("no main-field model loaded")]
    ModelNotLoaded,

    #[error("date {date:.3} outside model validity window [{min:.3}, {max:.3}]")]
    OutOfRange { date: f64, min: f64, max: f64 },

    #[error("invalid calculation options: {0}")]
    InvalidOptions(String),

    #[error("operation cancelled")]
    OperationCancelled,
}

impl Error {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// True for [`Error::OperationCancelled`], so callers can tell a user abort
    /// apart from a computation failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::OperationCancelled)
    }
}

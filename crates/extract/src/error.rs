//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An exclusion glob in the settings does not compile.
    #[display("invalid exclusion pattern `{pattern}`: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },
    /// A date format description in the settings does not compile.
    #[display("invalid date format `{_0}`")]
    InvalidDateFormat(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Both variants come from settings; nothing changes until they do.
        false
    }
}

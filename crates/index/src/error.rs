//! Index Error Types

use derive_more::{Display, Error};

/// An indexing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for indexing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an indexing failure.
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Render`]
///
/// ### Operational Errors
/// - [`ErrorKind::Settings`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading from the document store failed.
    Storage,
    /// A lookup or write through the content cache failed.
    Cache,
    /// Rasterizing, storing or thumbnailing a feature image failed.
    Render,
    /// The settings snapshot can't be applied (bad glob or date format).
    Settings,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache | Self::Render)
    }
}

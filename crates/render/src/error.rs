//! Render Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A render error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for render operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The rasterizer program was not found on `PATH`.
    #[display("rasterizer not found: {_0}")]
    RasterizerNotFound(#[error(not(source))] String),
    #[display("rasterizer timed out after {_0}s")]
    RasterizerTimeout(#[error(not(source))] u64),
    /// The rasterizer exited unsuccessfully. Without an exit code it was
    /// killed by a signal.
    #[display("rasterizer {program} failed with code {code:?}")]
    RasterizerFailed { program: String, code: Option<i32> },
    /// No rasterizer is registered for this kind of file.
    #[display("cannot rasterize {}", _0.display())]
    Unsupported(#[error(not(source))] PathBuf),
    /// The attachment could not be read from the document store.
    #[display("could not read attachment")]
    Source,
    /// Image data could not be decoded or encoded.
    #[display("invalid image data")]
    Image,
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RasterizerTimeout(_) | Self::Io)
    }
}

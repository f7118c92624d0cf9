//! Vault access errors.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file is not (or no longer) in the vault. Callers reacting to vault
    /// events usually treat this as "skip".
    #[display("not in vault: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Empty, absolute-prefixed, null-containing, or climbing above the root.
    #[display("invalid vault path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A filesystem path the walker produced that does not live under the
    /// vault root (e.g. through a symlinked directory).
    #[display("outside of vault root: {}", _0.display())]
    OutsideVault(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

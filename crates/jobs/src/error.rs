//! Job Registry Error Types

use crate::JobId;
use derive_more::{Display, Error};

/// A job registry error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job registry operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No job with this id is tracked (never created, or already retired).
    #[display("job not found: {_0}")]
    NotFound(#[error(not(source))] JobId),
    /// The job already completed or failed; terminal jobs never change.
    #[display("job already finished: {_0}")]
    AlreadyTerminal(#[error(not(source))] JobId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Neither variant changes by retrying: unknown ids stay unknown and
    /// terminal jobs stay terminal.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

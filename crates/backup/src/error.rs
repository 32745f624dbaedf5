//! Backup Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A backup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The prefix and file name don't make a usable object key.
    #[display("cannot build a destination key for {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// The local file could not be opened or read.
    #[display("cannot read {}", _0.display())]
    ReadFile(#[error(not(source))] PathBuf),
    /// The store refused the object.
    #[display("upload to {_0} failed")]
    Upload(#[error(not(source))] String),
    /// Listing remote objects failed part way through.
    #[display("listing remote objects under {_0} failed")]
    Listing(#[error(not(source))] String),
    /// The job registry refused a state change for a job this crate owns.
    #[display("job registry rejected an update")]
    Registry,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadFile(_) | Self::Upload(_) | Self::Listing(_))
    }
}

/// Render an error and every cause beneath it, outermost first, as
/// `"upload to media/a.jpg failed: transfer of media/a.jpg failed: network error: ..."`.
///
/// Job errors and transfer outcomes are plain strings, so this is the only
/// place the causes survive.
pub fn describe<E: std::error::Error + Send + Sync + 'static>(err: &exn::Exn<E>) -> String {
    let mut messages = Vec::new();
    collect(err.frame(), &mut messages);
    messages.join(": ")
}

fn collect(frame: &exn::Frame, messages: &mut Vec<String>) {
    let message = frame.to_string();
    // `Io` kinds repeat their source verbatim.
    if messages.last() != Some(&message) {
        messages.push(message);
    }
    for child in frame.children() {
        collect(child, messages);
    }
}

//! Local media inventory.
//!
//! [`scan`] walks a directory tree once and returns an immutable
//! [`FolderNode`] tree of every recognized image, RAW and video file, with
//! file counts and byte sizes aggregated at every level. A new scan always
//! builds a new tree; trees are never patched in place.

pub mod error;
mod extensions;
mod models;
mod scan;

pub use crate::extensions::{MediaKind, MediaType, classify};
pub use crate::models::{FileEntry, FolderNode, RemotePresence};
pub use crate::scan::{ScanIssue, ScanPolicy, ScanReport, scan};

//! Inventory models.
//!
//! These are the types handed to everything downstream of a scan: the
//! uploader picks files out of the tree, the reconciler annotates them with
//! remote presence, and the event stream serializes both.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Whether (and where) a file was found in remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePresence {
    pub exists: bool,
    /// The key the file is (or would be) stored under.
    pub key: String,
}

/// A single media file discovered by a scan.
///
/// Ids are generated per scan: rescanning an unchanged file yields a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub absolute_path: PathBuf,
    /// Path relative to the scan root, always `/`-separated.
    pub relative_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    /// Set only on copies returned by reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemotePresence>,
}
impl FileEntry {
    /// Content type for uploads, from the media extension table.
    pub fn content_type(&self) -> &'static str {
        crate::classify(&self.name).map(|media| media.content_type).unwrap_or("application/octet-stream")
    }

    /// A copy of this entry annotated with its remote presence.
    pub fn with_remote(&self, exists: bool, key: impl Into<String>) -> Self {
        Self {
            remote: Some(RemotePresence { exists, key: key.into() }),
            ..self.clone()
        }
    }

    /// `Some(true)` once reconciled and found remotely.
    pub fn exists_remotely(&self) -> Option<bool> {
        self.remote.as_ref().map(|remote| remote.exists)
    }
}

/// A directory in the inventory tree.
///
/// `file_count` and `total_size` are aggregates: this folder's own files
/// plus everything below it. Children keep directory listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub name: String,
    /// Path relative to the scan root (`""` for the root itself).
    pub relative_path: String,
    pub children: Vec<FolderNode>,
    pub files: Vec<FileEntry>,
    pub file_count: u64,
    pub total_size: u64,
}
impl FolderNode {
    pub(crate) fn new(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            ..Self::default()
        }
    }

    pub(crate) fn push_file(&mut self, file: FileEntry) {
        self.file_count += 1;
        self.total_size += file.size;
        self.files.push(file);
    }

    /// Merge a fully built child folder, rolling its aggregates up.
    pub(crate) fn push_child(&mut self, child: FolderNode) {
        self.file_count += child.file_count;
        self.total_size += child.total_size;
        self.children.push(child);
    }

    /// Total media files in this folder and below.
    pub fn total_files(&self) -> u64 {
        self.file_count
    }

    /// Total bytes of media in this folder and below.
    pub fn total_bytes(&self) -> u64 {
        self.total_size
    }

    /// Direct child folder by name.
    pub fn child(&self, name: &str) -> Option<&FolderNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Descend to a folder by its `/`-separated path relative to this node.
    ///
    /// An empty path returns `self`.
    pub fn folder(&self, relative_path: &str) -> Option<&FolderNode> {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Every file in this folder and below, depth first: a folder's own
    /// files come before its children's.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        let mut stack = vec![self];
        let mut current: std::slice::Iter<'_, FileEntry> = Default::default();
        std::iter::from_fn(move || {
            loop {
                if let Some(file) = current.next() {
                    return Some(file);
                }
                let node = stack.pop()?;
                // Push in reverse so children come out in listing order.
                stack.extend(node.children.iter().rev());
                current = node.files.iter();
            }
        })
    }
}

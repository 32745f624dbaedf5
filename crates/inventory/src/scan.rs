use crate::error::{ErrorKind, Result};
use crate::extensions::classify;
use crate::models::{FileEntry, FolderNode};
use exn::ResultExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};
use tracing::instrument;
use uuid::Uuid;

/// What to do when a directory can't be read or an entry can't be stat-ed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Abandon the whole scan on the first failure.
    #[default]
    Abort,
    /// Leave the entry out of the tree and record a [`ScanIssue`].
    SkipAndReport,
}

/// An entry left out of the tree under [`ScanPolicy::SkipAndReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanIssue {
    pub path: PathBuf,
    pub message: String,
}

/// The best-effort tree plus everything that had to be skipped to build it.
///
/// `issues` is always empty for [`ScanPolicy::Abort`]; the scan would have
/// failed instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub tree: FolderNode,
    pub issues: Vec<ScanIssue>,
}

enum WalkEntry {
    File(FileEntry),
    Descend { path: PathBuf, name: String, relative: String },
    Skip,
}

struct Walker {
    policy: ScanPolicy,
    issues: Vec<ScanIssue>,
}

impl Walker {
    fn new(policy: ScanPolicy) -> Self {
        Self { policy, issues: Vec::new() }
    }

    /// Build the node for `dir`, recursing into subdirectories so that every
    /// child is complete (aggregates included) before it's merged upwards.
    fn walk<'a>(&'a mut self, dir: PathBuf, name: String, relative: String) -> BoxFuture<'a, Result<FolderNode>> {
        Box::pin(async move {
            let mut node = FolderNode::new(name, relative.as_str());
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    self.tolerate(&dir, err)?;
                    return Ok(node);
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    // The listing itself broke; nothing more to read here.
                    Err(err) => {
                        self.tolerate(&dir, err)?;
                        break;
                    },
                };
                match Self::process_entry(&entry, &relative).await {
                    Ok(WalkEntry::File(file)) => node.push_file(file),
                    Ok(WalkEntry::Descend { path, name, relative }) => {
                        let child = self.walk(path, name, relative).await?;
                        node.push_child(child);
                    },
                    Ok(WalkEntry::Skip) => {},
                    Err(err) => self.tolerate(&entry.path(), err)?,
                }
            }
            Ok(node)
        })
    }

    /// Stat a single entry and decide what it becomes in the tree.
    async fn process_entry(entry: &DirEntry, parent_relative: &str) -> io::Result<WalkEntry> {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata().await?;
        let relative = match parent_relative.is_empty() {
            true => name.clone(),
            false => format!("{parent_relative}/{name}"),
        };
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend { path, name, relative });
        }
        // Note: symlinks aren't followed, same as anything else that isn't a
        // regular file.
        if !metadata.is_file() || classify(&name).is_none() {
            return Ok(WalkEntry::Skip);
        }
        let modified = OffsetDateTime::from(metadata.modified()?);
        Ok(WalkEntry::File(FileEntry {
            id: Uuid::new_v4(),
            name,
            size: metadata.len(),
            absolute_path: path,
            relative_path: relative,
            modified,
            remote: None,
        }))
    }

    fn tolerate(&mut self, path: &Path, err: io::Error) -> Result<()> {
        match self.policy {
            ScanPolicy::Abort => Err(err).or_raise(|| ErrorKind::ScanIo(path.to_path_buf())),
            ScanPolicy::SkipAndReport => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                self.issues.push(ScanIssue {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
                Ok(())
            },
        }
    }
}

/// Walk `root` into an inventory tree of recognized media files.
///
/// Files with unrecognized extensions are left out of the tree and out of
/// every count. Every included file gets a fresh id.
///
/// # Errors
/// - [`PathNotFound`](ErrorKind::PathNotFound) if `root` doesn't exist.
/// - [`NotADirectory`](ErrorKind::NotADirectory) if `root` isn't a directory.
/// - [`ScanIo`](ErrorKind::ScanIo) on the first unreadable entry, but only
///   under [`ScanPolicy::Abort`].
///
/// # Examples
///
/// ```no_run
/// use shoebox_inventory::{ScanPolicy, scan};
///
/// # async fn example() -> shoebox_inventory::error::Result<()> {
/// let report = scan("/srv/media", ScanPolicy::SkipAndReport).await?;
/// println!("{} files, {} bytes", report.tree.total_files(), report.tree.total_bytes());
/// for issue in &report.issues {
///     eprintln!("skipped {}: {}", issue.path.display(), issue.message);
/// }
/// # Ok(())
/// # }
/// ```
#[instrument(skip(root), fields(root = %root.as_ref().display()))]
pub async fn scan(root: impl AsRef<Path>, policy: ScanPolicy) -> Result<ScanReport> {
    let root = std::path::absolute(root.as_ref()).or_raise(|| ErrorKind::PathNotFound(root.as_ref().to_path_buf()))?;
    let metadata = match fs::metadata(&root).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => exn::bail!(ErrorKind::PathNotFound(root)),
        Err(err) => return Err(err).or_raise(|| ErrorKind::ScanIo(root)),
    };
    if !metadata.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(root));
    }
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut walker = Walker::new(policy);
    let tree = walker.walk(root, name, String::new()).await?;
    tracing::info!(
        files = tree.total_files(),
        bytes = tree.total_bytes(),
        issues = walker.issues.len(),
        "scan complete"
    );
    Ok(ScanReport { tree, issues: walker.issues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;
    use std::fs as sync_fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, bytes: usize) {
        let path = root.join(relative);
        sync_fs::create_dir_all(path.parent().unwrap()).unwrap();
        sync_fs::write(path, vec![0u8; bytes]).unwrap();
    }

    /// Recompute aggregates from scratch and compare, at every depth.
    fn assert_aggregates(node: &FolderNode) -> (u64, u64) {
        let mut count = node.files.len() as u64;
        let mut size: u64 = node.files.iter().map(|f| f.size).sum();
        for child in &node.children {
            let (c, s) = assert_aggregates(child);
            count += c;
            size += s;
        }
        assert_eq!(node.file_count, count, "file count mismatch at {:?}", node.relative_path);
        assert_eq!(node.total_size, size, "size mismatch at {:?}", node.relative_path);
        (count, size)
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let report = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        assert_eq!(report.tree.total_files(), 0);
        assert_eq!(report.tree.total_bytes(), 0);
        assert!(report.tree.children.is_empty());
        assert!(report.issues.is_empty());
        assert_eq!(report.tree.relative_path, "");
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = scan(dir.path().join("nope"), ScanPolicy::Abort).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_root_is_a_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.jpg", 1);
        let err = scan(dir.path().join("a.jpg"), ScanPolicy::Abort).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[rstest]
    #[case(&["a.jpg"], &["notes.txt"])]
    #[case(&["a.JPG", "b/c.nef", "b/d/e/f.mov"], &["b/x.txt", "b/d/.DS_Store", "b/d/e/Thumbs.db"])]
    #[case(&["deep/er/and/deeper/still/x.dng"], &[])]
    #[case(&[], &["only/junk.pdf", "more/junk.xmp"])]
    #[tokio::test]
    async fn test_counts_only_media(#[case] media: &[&str], #[case] other: &[&str]) {
        let dir = TempDir::new().unwrap();
        for (i, path) in media.iter().enumerate() {
            touch(dir.path(), path, i + 1);
        }
        for path in other {
            touch(dir.path(), path, 7);
        }
        let report = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        assert_eq!(report.tree.total_files(), media.len() as u64);
        let expected_bytes: u64 = (1..=media.len() as u64).sum();
        assert_eq!(report.tree.total_bytes(), expected_bytes);
        assert_aggregates(&report.tree);
    }

    #[tokio::test]
    async fn test_tree_shape_and_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "top.mp4", 100);
        touch(dir.path(), "Photos/2024/b.jpg", 20);
        touch(dir.path(), "Photos/2024/c.cr2", 30);
        touch(dir.path(), "Photos/cover.png", 1);
        let report = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        let tree = &report.tree;
        assert_aggregates(tree);
        let year = tree.folder("Photos/2024").unwrap();
        assert_eq!(year.relative_path, "Photos/2024");
        assert_eq!(year.total_files(), 2);
        assert_eq!(year.total_bytes(), 50);
        let mut relative: Vec<&str> = tree.files().map(|f| f.relative_path.as_str()).collect();
        relative.sort();
        assert_eq!(relative, vec!["Photos/2024/b.jpg", "Photos/2024/c.cr2", "Photos/cover.png", "top.mp4"]);
        for file in tree.files() {
            assert!(file.absolute_path.is_absolute());
            assert!(file.absolute_path.ends_with(&file.relative_path));
            assert!(file.remote.is_none());
        }
    }

    #[tokio::test]
    async fn test_ids_are_fresh_per_scan() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.jpg", 1);
        touch(dir.path(), "b.jpg", 1);
        let first = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        let second = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        let first_ids: HashSet<Uuid> = first.tree.files().map(|f| f.id).collect();
        let second_ids: HashSet<Uuid> = second.tree.files().map(|f| f.id).collect();
        assert_eq!(first_ids.len(), 2);
        assert!(first_ids.is_disjoint(&second_ids));
    }

    #[test]
    fn test_abort_policy_raises() {
        let mut walker = Walker::new(ScanPolicy::Abort);
        let err = walker.tolerate(Path::new("/media/bad"), io::Error::other("stat failed")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ScanIo(p) if p == Path::new("/media/bad")));
        assert!(walker.issues.is_empty());
    }

    #[test]
    fn test_skip_policy_records_issue() {
        let mut walker = Walker::new(ScanPolicy::SkipAndReport);
        walker.tolerate(Path::new("/media/bad"), io::Error::other("stat failed")).unwrap();
        assert_eq!(
            walker.issues,
            vec![ScanIssue {
                path: PathBuf::from("/media/bad"),
                message: "stat failed".to_string()
            }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "real/a.jpg", 3);
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.jpg"), dir.path().join("dangling.jpg")).unwrap();
        let report = scan(dir.path(), ScanPolicy::Abort).await.unwrap();
        assert_eq!(report.tree.total_files(), 1);
        assert!(report.tree.child("link").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_follows_policy() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "ok.jpg", 2);
        touch(dir.path(), "locked/hidden.jpg", 5);
        let locked = dir.path().join("locked");
        sync_fs::set_permissions(&locked, sync_fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores directory permissions.
        if sync_fs::read_dir(&locked).is_ok() {
            sync_fs::set_permissions(&locked, sync_fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let aborted = scan(dir.path(), ScanPolicy::Abort).await;
        let skipped = scan(dir.path(), ScanPolicy::SkipAndReport).await;
        sync_fs::set_permissions(&locked, sync_fs::Permissions::from_mode(0o755)).unwrap();

        let err = aborted.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ScanIo(path) if path == &locked));

        let report = skipped.unwrap();
        assert_eq!(report.tree.total_files(), 1);
        assert_eq!(report.tree.total_bytes(), 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].path, locked);
    }
}

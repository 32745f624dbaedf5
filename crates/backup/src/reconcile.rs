//! Sync reconciliation.
//!
//! Works out which local files are already in the store by listing every
//! remote key under the destination prefix and comparing relative paths.
//! The whole listing is assembled before any file is judged, so a file
//! that only shows up on the last page is never reported missing.

use crate::error::{ErrorKind, Result, describe};
use crate::keys::remote_key;
use exn::ResultExt;
use futures::TryStreamExt;
use serde::Serialize;
use shoebox_inventory::FileEntry;
use shoebox_jobs::{Event, Job, JobId, JobKind, JobRegistry};
use shoebox_storage::{RemoteStore, StoreHandle, strip_key_prefix};
use std::collections::{BTreeMap, HashSet};
use tracing::instrument;

/// Files between progress updates (and cooperative yields) while annotating.
pub const DEFAULT_RECONCILE_BATCH: usize = 50;

/// Every local file, annotated with whether it's already stored remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Annotated copies of the local files, keyed by relative path.
    pub files: BTreeMap<String, FileEntry>,
    /// How many objects the listing returned under the prefix.
    pub remote_object_count: usize,
}

impl SyncStatus {
    /// Files not yet in the store.
    pub fn missing(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values().filter(|file| file.exists_remotely() == Some(false))
    }

    pub fn present_count(&self) -> usize {
        self.files.values().filter(|file| file.exists_remotely() == Some(true)).count()
    }
}

struct RemoteListing {
    relative_paths: HashSet<String>,
    object_count: usize,
}

/// List every key under `prefix/`, one page at a time, calling `on_page`
/// with the running page and key counts.
async fn list_remote(store: &dyn RemoteStore, prefix: &str, mut on_page: impl FnMut(usize, usize)) -> Result<RemoteListing> {
    let prefix = prefix.trim_end_matches('/');
    let list_prefix = match prefix.is_empty() {
        true => String::new(),
        false => format!("{prefix}/"),
    };
    let mut listing = RemoteListing {
        relative_paths: HashSet::new(),
        object_count: 0,
    };
    let mut pages = store.list_pages(&list_prefix);
    let mut count = 0;
    while let Some(page) = pages.try_next().await.or_raise(|| ErrorKind::Listing(prefix.to_string()))? {
        count += 1;
        listing.object_count += page.keys.len();
        listing.relative_paths.extend(
            page.keys
                .iter()
                .filter_map(|key| strip_key_prefix(prefix, key))
                .map(str::to_string),
        );
        on_page(count, listing.object_count);
    }
    Ok(listing)
}

fn annotate(file: &FileEntry, prefix: &str, listing: &RemoteListing) -> FileEntry {
    let exists = listing.relative_paths.contains(&file.relative_path);
    file.with_remote(exists, remote_key(prefix, &file.relative_path))
}

/// Compare `files` against everything stored under `prefix`.
///
/// Running it twice against an unchanged store gives the same answer.
#[instrument(skip(store, files), fields(store = store.name(), files = files.len()))]
pub async fn compute_status(store: &dyn RemoteStore, files: &[FileEntry], prefix: &str) -> Result<SyncStatus> {
    let listing = list_remote(store, prefix, |_, _| {}).await?;
    let files = files
        .iter()
        .map(|file| (file.relative_path.clone(), annotate(file, prefix, &listing)))
        .collect();
    Ok(SyncStatus {
        files,
        remote_object_count: listing.object_count,
    })
}

/// Runs reconciliation as a tracked `scan_check` job.
#[derive(Clone)]
pub struct Reconciler {
    store: StoreHandle,
    registry: JobRegistry,
    batch: usize,
}

impl Reconciler {
    pub fn new(store: StoreHandle, registry: JobRegistry) -> Self {
        Self {
            store,
            registry,
            batch: DEFAULT_RECONCILE_BATCH,
        }
    }

    /// Report progress (and yield) every `batch` files.
    pub fn with_batch_size(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Create a `scan_check` job and reconcile in the background.
    ///
    /// The result arrives as a single [`SyncResult`](Event::SyncResult) on
    /// the registry's event stream once the job has completed.
    pub fn start(&self, files: Vec<FileEntry>, prefix: impl Into<String>) -> Job {
        let job = self.registry.create(JobKind::ScanCheck, files.len() as u64);
        let reconciler = self.clone();
        let prefix = prefix.into();
        let job_id = job.id;
        tokio::spawn(async move {
            // Failures already ended the job.
            let _ = reconciler.run(job_id, &files, &prefix).await;
        });
        job
    }

    /// Reconcile under an existing job, failing the job on error.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn run(&self, job_id: JobId, files: &[FileEntry], prefix: &str) -> Result<SyncStatus> {
        match self.reconcile(job_id, files, prefix).await {
            Ok(status) => Ok(status),
            Err(err) => {
                tracing::error!(job = %job_id, error = ?err, "reconciliation failed");
                let _ = self.registry.fail(job_id, describe(&err));
                Err(err)
            },
        }
    }

    async fn reconcile(&self, job_id: JobId, files: &[FileEntry], prefix: &str) -> Result<SyncStatus> {
        let registry = &self.registry;
        let listing = list_remote(self.store.as_ref(), prefix, |pages, keys| {
            let label = format!("listing remote objects (page {pages}, {keys} keys)");
            if let Err(err) = registry.update_progress(job_id, 0, Some(label), None) {
                tracing::debug!(job = %job_id, error = ?err, "progress update rejected");
            }
        })
        .await?;

        let mut annotated = BTreeMap::new();
        for (index, file) in files.iter().enumerate() {
            annotated.insert(file.relative_path.clone(), annotate(file, prefix, &listing));
            let done = index + 1;
            if done % self.batch == 0 && done < files.len() {
                registry
                    .update_progress(job_id, done as u64, Some(file.relative_path.clone()), None)
                    .or_raise(|| ErrorKind::Registry)?;
                tokio::task::yield_now().await;
            }
        }
        registry
            .update_progress(job_id, files.len() as u64, None, None)
            .or_raise(|| ErrorKind::Registry)?;
        registry.complete(job_id).or_raise(|| ErrorKind::Registry)?;

        let status = SyncStatus {
            files: annotated,
            remote_object_count: listing.object_count,
        };
        tracing::info!(
            job = %job_id,
            local = status.files.len(),
            present = status.present_count(),
            remote = status.remote_object_count,
            "reconciliation finished"
        );
        registry.publish(Event::SyncResult {
            job_id,
            sync_status: status.files.clone(),
            remote_object_count: status.remote_object_count,
        });
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoebox_jobs::JobStatus;
    use shoebox_storage::backend::MockStore;
    use std::path::PathBuf;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn entry(relative_path: &str) -> FileEntry {
        FileEntry {
            id: Default::default(),
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            size: 1,
            absolute_path: PathBuf::from("/srv/media").join(relative_path),
            relative_path: relative_path.to_string(),
            modified: OffsetDateTime::UNIX_EPOCH,
            remote: None,
        }
    }

    #[tokio::test]
    async fn test_annotates_presence() {
        let store = MockStore::with_keys(["media/a.jpg", "media/sub/b.jpg", "media", "other/c.jpg"]);
        let files = [entry("a.jpg"), entry("sub/b.jpg"), entry("c.jpg")];
        let status = compute_status(&store, &files, "media").await.unwrap();

        assert_eq!(status.remote_object_count, 2);
        let a = &status.files["a.jpg"];
        assert_eq!(a.exists_remotely(), Some(true));
        assert_eq!(a.remote.as_ref().unwrap().key, "media/a.jpg");
        assert_eq!(a.id, files[0].id);
        assert_eq!(status.files["sub/b.jpg"].exists_remotely(), Some(true));
        let c = &status.files["c.jpg"];
        assert_eq!(c.exists_remotely(), Some(false));
        assert_eq!(c.remote.as_ref().unwrap().key, "media/c.jpg");
        assert_eq!(status.missing().count(), 1);
        assert_eq!(status.present_count(), 2);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let store = MockStore::with_keys(["media/a.jpg"]);
        let files = [entry("a.jpg"), entry("b.jpg")];
        let first = compute_status(&store, &files, "media/").await.unwrap();
        let second = compute_status(&store, &files, "media").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let store = MockStore::with_keys(["media/a.jpg"]);
        store.set_listing_fails(true);
        let err = compute_status(&store, &[entry("a.jpg")], "media").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Listing(prefix) if prefix == "media"));
    }

    #[tokio::test]
    async fn test_tracked_listing_failure_names_the_cause() {
        let store = Arc::new(MockStore::with_keys(["media/a.jpg"]));
        store.set_listing_fails(true);
        let registry = JobRegistry::default();
        let job = registry.create(JobKind::ScanCheck, 1);

        let err = Reconciler::new(store, registry.clone())
            .run(job.id, &[entry("a.jpg")], "media")
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Listing(_)));

        let failed = registry.get(job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.errors,
            vec![
                "listing remote objects under media failed: listing objects under media/ failed: \
                 backend error: mock store rejected the listing"
            ]
        );
    }

    #[tokio::test]
    async fn test_tracked_run_batches_progress() {
        let keys: Vec<String> = (0..5).map(|i| format!("media/{i}.jpg")).collect();
        let store = Arc::new(MockStore::with_keys(&keys).with_page_size(2));
        let registry = JobRegistry::new(256, std::time::Duration::from_secs(30));
        let reconciler = Reconciler::new(store, registry.clone()).with_batch_size(2);
        let files: Vec<FileEntry> = (0..5).map(|i| entry(&format!("{i}.jpg"))).collect();
        let job = registry.create(JobKind::ScanCheck, files.len() as u64);
        let mut events = registry.subscribe();

        let status = reconciler.run(job.id, &files, "media").await.unwrap();
        assert_eq!(status.present_count(), 5);

        let mut page_labels = 0;
        let mut progress = Vec::new();
        let mut result = None;
        while let Some(event) = events.try_recv() {
            match event {
                Event::JobUpdate { job } if job.status == JobStatus::Running => {
                    match job.current_item.as_deref() {
                        Some(label) if label.starts_with("listing remote objects") => page_labels += 1,
                        _ => progress.push(job.completed),
                    }
                },
                Event::SyncResult { sync_status, remote_object_count, .. } => {
                    result = Some((sync_status.len(), remote_object_count));
                },
                _ => {},
            }
        }
        assert_eq!(page_labels, 3);
        assert_eq!(progress, vec![2, 4, 5]);
        assert_eq!(result, Some((5, 5)));
        assert_eq!(registry.get(job.id).unwrap().status, JobStatus::Completed);
    }
}

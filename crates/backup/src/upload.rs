use crate::error::{ErrorKind, Result, describe};
use crate::keys::{KeyClock, destination_key};
use crate::strategy::{DEFAULT_STREAMING_THRESHOLD, TransferStrategy};
use exn::ResultExt;
use shoebox_inventory::FileEntry;
use shoebox_jobs::{Event, Job, JobId, JobKind, JobRegistry, TransferOutcome};
use shoebox_storage::{StoreHandle, TransferProgress};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::instrument;

/// Where and how a batch of files is uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Key prefix every destination key starts with.
    pub destination_prefix: String,
    /// Keep relative paths in keys, or flatten to `<timestamp>_<name>`.
    pub preserve_structure: bool,
    /// Remove the local original after a successful upload.
    pub delete_after_upload: bool,
    /// Opaque ids echoed back on the upload events.
    pub context_ids: Vec<String>,
}

/// Uploads batches of files, one file at a time, as tracked jobs.
#[derive(Clone)]
pub struct Uploader {
    store: StoreHandle,
    registry: JobRegistry,
    streaming_threshold: u64,
    clock: Arc<KeyClock>,
}

impl Uploader {
    pub fn new(store: StoreHandle, registry: JobRegistry) -> Self {
        Self {
            store,
            registry,
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            clock: Arc::new(KeyClock::new()),
        }
    }

    /// Files strictly larger than `threshold` bytes are streamed.
    pub fn with_streaming_threshold(mut self, threshold: u64) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    /// Create an upload job and run it in the background.
    ///
    /// Returns as soon as the job exists; progress and the final
    /// [`BatchUploadResult`](Event::BatchUploadResult) arrive on the
    /// registry's event stream.
    pub fn start(&self, files: Vec<FileEntry>, request: UploadRequest) -> Job {
        let job = self.registry.create(JobKind::Upload, files.len() as u64);
        let uploader = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            // Failures already ended the job; nobody is waiting on this task.
            let _ = uploader.run(job_id, files, request).await;
        });
        job
    }

    /// Upload `files` in order under an existing job.
    ///
    /// Per-file failures are recorded in the outcome and the job and do not
    /// stop the batch; the job completes once every file has been tried. An
    /// error is returned only if the batch itself couldn't run, in which
    /// case the job has been failed.
    #[instrument(skip_all, fields(job = %job_id, files = files.len()))]
    pub async fn run(&self, job_id: JobId, files: Vec<FileEntry>, request: UploadRequest) -> Result<Vec<TransferOutcome>> {
        match self.upload_batch(job_id, &files, &request).await {
            Ok(outcomes) => Ok(outcomes),
            Err(err) => {
                tracing::error!(job = %job_id, error = ?err, "upload batch aborted");
                // Only fails if the job is already terminal.
                let _ = self.registry.fail(job_id, describe(&err));
                Err(err)
            },
        }
    }

    async fn upload_batch(&self, job_id: JobId, files: &[FileEntry], request: &UploadRequest) -> Result<Vec<TransferOutcome>> {
        let mut outcomes = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            self.registry
                .update_progress(job_id, index as u64, Some(file.name.clone()), None)
                .or_raise(|| ErrorKind::Registry)?;
            let outcome = self.upload_one(job_id, index as u64, file, request).await;
            self.registry
                .update_progress(job_id, index as u64 + 1, None, outcome.error.clone())
                .or_raise(|| ErrorKind::Registry)?;
            outcomes.push(outcome);
        }
        let job = self.registry.complete(job_id).or_raise(|| ErrorKind::Registry)?;
        tracing::info!(job = %job_id, completed = job.completed, failed = job.failed, "upload batch finished");
        self.registry.publish(Event::BatchUploadResult {
            job_id,
            outcomes: outcomes.clone(),
            context_ids: request.context_ids.clone(),
        });
        Ok(outcomes)
    }

    async fn upload_one(&self, job_id: JobId, completed: u64, file: &FileEntry, request: &UploadRequest) -> TransferOutcome {
        let key = match destination_key(&request.destination_prefix, file, request.preserve_structure, &self.clock) {
            Ok(key) => key,
            Err(err) => {
                let fallback = crate::keys::remote_key(&request.destination_prefix, &file.relative_path);
                return self.failed(file, fallback, &err);
            },
        };
        if let Err(err) = self.transfer(job_id, completed, file, &key).await {
            return self.failed(file, key, &err);
        }
        if request.delete_after_upload {
            match tokio::fs::remove_file(&file.absolute_path).await {
                Ok(()) => tracing::debug!(path = %file.absolute_path.display(), "removed local original"),
                Err(err) => tracing::warn!(
                    path = %file.absolute_path.display(),
                    error = %err,
                    "uploaded, but could not remove local original"
                ),
            }
        }
        self.registry.publish(Event::FileUploadSucceeded {
            job_id,
            relative_path: file.relative_path.clone(),
            destination_key: key.clone(),
            context_ids: request.context_ids.clone(),
        });
        TransferOutcome::succeeded(&file.absolute_path, key)
    }

    async fn transfer(&self, job_id: JobId, completed: u64, file: &FileEntry, key: &str) -> Result<()> {
        let strategy = TransferStrategy::with_threshold(file.size, self.streaming_threshold);
        tracing::debug!(job = %job_id, key, size = file.size, ?strategy, "uploading");
        let body = strategy.open(&file.absolute_path).await?;
        let reporter = LabelProgress::new(self.registry.clone(), job_id, completed, &file.name);
        let progress: Option<&dyn TransferProgress> = match strategy {
            TransferStrategy::Streaming => Some(&reporter),
            TransferStrategy::Buffered => None,
        };
        self.store
            .put_object(key, body, file.content_type(), progress)
            .await
            .or_raise(|| ErrorKind::Upload(key.to_string()))?;
        Ok(())
    }

    fn failed(&self, file: &FileEntry, key: String, err: &crate::error::Error) -> TransferOutcome {
        tracing::warn!(path = %file.absolute_path.display(), key, error = ?err, "upload failed");
        let message = format!("{}: {}", file.relative_path, describe(err));
        TransferOutcome::failed(&file.absolute_path, key, message)
    }
}

/// Maps byte-level progress onto the job label as `"name.ext (42%)"`,
/// touching the registry only when the percentage changes.
struct LabelProgress {
    registry: JobRegistry,
    job_id: JobId,
    completed: u64,
    name: String,
    last_percent: AtomicU8,
}

impl LabelProgress {
    fn new(registry: JobRegistry, job_id: JobId, completed: u64, name: &str) -> Self {
        Self {
            registry,
            job_id,
            completed,
            name: name.to_string(),
            last_percent: AtomicU8::new(u8::MAX),
        }
    }
}

impl TransferProgress for LabelProgress {
    fn on_progress(&self, loaded: u64, total: u64) {
        let percent = Job::progress_of(loaded, total);
        if self.last_percent.swap(percent, Ordering::Relaxed) == percent {
            return;
        }
        let label = format!("{} ({percent}%)", self.name);
        if let Err(err) = self.registry.update_progress(self.job_id, self.completed, Some(label), None) {
            tracing::debug!(job = %self.job_id, error = ?err, "progress update rejected");
        }
    }
}

use crate::cli::{ScanArgs, UploadArgs};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use shoebox_backup::{Reconciler, UploadRequest, Uploader};
use shoebox_config::Config;
use shoebox_inventory::{FileEntry, ScanPolicy, ScanReport, scan};
use shoebox_jobs::{Event, JobId, JobRegistry, JobStatus, Subscription};
use shoebox_storage::StoreHandle;
use shoebox_storage::backend::S3Store;
use std::io::{self, Write};
use std::pin::pin;
use std::sync::Arc;

/// Everything a command needs, built once from configuration.
pub struct Context {
    pub config: Config,
    pub store: StoreHandle,
    pub registry: JobRegistry,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let store = &config.store;
        let part_size = usize::try_from(config.transfer.part_size).unwrap_or(usize::MAX);
        let s3 = S3Store::new(
            store.name.clone(),
            store.bucket.clone(),
            store.region.clone(),
            store.endpoint.clone(),
            store.key_id.clone(),
            store.key_secret.clone(),
        )
        .with_part_size(part_size);
        let registry = JobRegistry::new(config.jobs.broadcast_capacity, config.retire_after());
        Self {
            store: Arc::new(s3),
            registry,
            config,
        }
    }

    fn scan_policy(&self, args: &ScanArgs) -> ScanPolicy {
        match args.skip_errors {
            true => ScanPolicy::SkipAndReport,
            false => self.config.backup.scan_policy,
        }
    }

    async fn scan(&self, args: &ScanArgs) -> Result<ScanReport> {
        let report = scan(&self.config.backup.root, self.scan_policy(args)).await.or_raise(|| ErrorKind::Scan)?;
        for issue in &report.issues {
            tracing::warn!(path = %issue.path.display(), message = %issue.message, "skipped during scan");
        }
        Ok(report)
    }
}

pub async fn probe(context: &Context) -> Result<()> {
    context.store.head_bucket().await.or_raise(|| ErrorKind::Store)?;
    println!("bucket {} on store {} is reachable", context.store.bucket(), context.store.name());
    Ok(())
}

pub async fn scan_totals(context: &Context, args: &ScanArgs) -> Result<()> {
    let report = context.scan(args).await?;
    let tree = &report.tree;
    let mut out = io::stdout().lock();
    writeln!(out, "{}: {} files, {} bytes", tree.name, tree.total_files(), tree.total_bytes()).or_raise(|| ErrorKind::Output)?;
    for child in &tree.children {
        writeln!(out, "  {}/: {} files, {} bytes", child.name, child.total_files(), child.total_bytes())
            .or_raise(|| ErrorKind::Output)?;
    }
    if !report.issues.is_empty() {
        writeln!(out, "{} entries skipped", report.issues.len()).or_raise(|| ErrorKind::Output)?;
    }
    Ok(())
}

pub async fn check(context: &Context, args: &ScanArgs) -> Result<()> {
    let report = context.scan(args).await?;
    let prefix = context.config.base_folder_name().or_raise(|| ErrorKind::Config)?;
    let files: Vec<FileEntry> = report.tree.files().cloned().collect();
    let events = context.registry.subscribe();
    let reconciler = Reconciler::new(context.store.clone(), context.registry.clone())
        .with_batch_size(context.config.jobs.reconcile_batch);
    let job = reconciler.start(files, prefix);
    follow(events, job.id, |event| matches!(event, Event::SyncResult { job_id, .. } if *job_id == job.id)).await
}

pub async fn upload(context: &Context, args: &UploadArgs) -> Result<()> {
    let report = context.scan(&args.scan).await?;
    let tree = match args.folder.as_deref() {
        Some(folder) => report.tree.folder(folder).ok_or_raise(|| ErrorKind::FolderNotFound(folder.to_string()))?,
        None => &report.tree,
    };
    let files: Vec<FileEntry> = tree.files().cloned().collect();
    let request = UploadRequest {
        destination_prefix: context.config.base_folder_name().or_raise(|| ErrorKind::Config)?,
        preserve_structure: !args.flat,
        delete_after_upload: args.delete,
        context_ids: args.context_ids.clone(),
    };
    tracing::info!(files = files.len(), bytes = tree.total_bytes(), prefix = %request.destination_prefix, "starting upload");
    let events = context.registry.subscribe();
    let uploader = Uploader::new(context.store.clone(), context.registry.clone())
        .with_streaming_threshold(context.config.transfer.streaming_threshold);
    let job = uploader.start(files, request);
    follow(events, job.id, |event| matches!(event, Event::BatchUploadResult { job_id, .. } if *job_id == job.id)).await
}

/// Print events as JSON lines until `done` matches, or the job fails.
async fn follow(events: Subscription, job_id: JobId, done: impl Fn(&Event) -> bool) -> Result<()> {
    let mut events = pin!(events.into_stream());
    while let Some(event) = events.next().await {
        let line = serde_json::to_string(&event).or_raise(|| ErrorKind::Output)?;
        writeln!(io::stdout().lock(), "{line}").or_raise(|| ErrorKind::Output)?;
        if done(&event) {
            return Ok(());
        }
        if let Event::JobUpdate { job } = &event
            && job.id == job_id
            && job.status == JobStatus::Failed
        {
            exn::bail!(ErrorKind::JobFailed(job.errors.join("; ")));
        }
    }
    exn::bail!(ErrorKind::StreamClosed)
}

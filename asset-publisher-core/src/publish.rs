//! High-level pipeline: decides, per file, whether to skip or upload, and executes it.
//!
//! For each input path the [`Publisher`]:
//!   - derives the remote key (see [`crate::remote_path`])
//!   - consults the [`UploadLedger`] (unless refreshing)
//!   - asks the store whether the key exists (unless overwriting or refreshing)
//!   - uploads with bounded retry, records the key and optionally deletes the local file
//!
//! After every file reached a terminal state it removes emptied directories,
//! invokes the version hook, flushes the ledger once and returns a [`PublishReport`].
//!
//! # Error Handling
//! Nothing in a run aborts the batch. Per-file failures become
//! [`UploadOutcome::Failed`]; cleanup, hook and ledger failures are logged and
//! reflected in the report.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PublishConfig;
use crate::contract::{ObjectStore, PathMapper, PutOptions, VersionHook};
use crate::existence::{self, IndeterminatePolicy, Presence};
use crate::ledger::UploadLedger;
use crate::remote_path::{base_path, resolve, FileTask};
use crate::retry::{max_attempts, put_options, upload_with_retry, Backoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The put attempt budget ran out.
    Upload,
    /// The existence check could not be settled and the policy said to fail.
    ExistenceCheck,
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { url: String },
    SkippedRemoteExists,
    SkippedLedgerHit,
    /// Test mode: the file would have been uploaded.
    DryRun,
    Failed {
        kind: FailureKind,
        code: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub local_path: String,
    pub remote_key: String,
    pub outcome: UploadOutcome,
    /// Whether the local file was removed after upload.
    pub local_deleted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub uploaded: usize,
    pub skipped_remote: usize,
    pub skipped_ledger: usize,
    pub failed: usize,
    pub dry_run: usize,
    /// Local file deletions and directory removals that failed.
    pub cleanup_failures: usize,
}

impl RunStatistics {
    fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { .. } => self.uploaded += 1,
            UploadOutcome::SkippedRemoteExists => self.skipped_remote += 1,
            UploadOutcome::SkippedLedgerHit => self.skipped_ledger += 1,
            UploadOutcome::DryRun => self.dry_run += 1,
            UploadOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Debug)]
pub struct PublishReport {
    pub files: Vec<FileReport>,
    pub stats: RunStatistics,
    pub ledger_flushed: bool,
    pub version_updated: bool,
}

/// Per-run values shared by every file task.
struct RunContext<'a> {
    base_path: String,
    ledger: &'a Mutex<UploadLedger>,
    options: PutOptions,
    max_attempts: u32,
    total: usize,
}

/// Per-file outcome plus whether the local-delete step failed.
struct TaskResult {
    report: FileReport,
    cleanup_failed: bool,
}

pub struct Publisher<S> {
    store: S,
    config: PublishConfig,
    mapper: Option<Box<dyn PathMapper>>,
    version_hook: Option<Box<dyn VersionHook>>,
    backoff: Box<dyn Backoff>,
}

impl<S> Publisher<S>
where
    S: ObjectStore,
{
    pub fn new(store: S, config: PublishConfig) -> Self {
        let backoff = config.backoff.build();
        Self {
            store,
            config,
            mapper: None,
            version_hook: None,
            backoff,
        }
    }

    pub fn with_mapper(mut self, mapper: impl PathMapper + 'static) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_version_hook(mut self, hook: impl VersionHook + 'static) -> Self {
        self.version_hook = Some(Box::new(hook));
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Publish `files`, whose paths are made relative to `output_root`
    /// (or the configured build root) to form remote keys.
    pub async fn run(&self, files: &[String], output_root: Option<&Path>) -> PublishReport {
        if self.config.test {
            info!("[PUBLISH] Running in test mode, files will not really be uploaded");
        } else {
            info!(files = files.len(), "[PUBLISH] Starting upload run");
        }

        let tasks: Vec<FileTask> = files.iter().map(|f| FileTask::new(f.as_str())).collect();
        let ledger = Mutex::new(UploadLedger::load(
            self.config.enable_memory,
            &self.config.memory_file_path,
        ));
        let ctx = RunContext {
            base_path: base_path(output_root, &self.config.build_root, self.mapper.is_some()),
            ledger: &ledger,
            options: put_options(self.config.overwrite, self.config.timeout()),
            max_attempts: max_attempts(self.config.retry_count),
            total: tasks.len(),
        };
        debug!(base_path = %ctx.base_path, max_attempts = ctx.max_attempts, "[PUBLISH] Run context prepared");

        let results: Vec<TaskResult> = stream::iter(tasks.iter().enumerate())
            .map(|(index, task)| self.process_file(index, task, &ctx))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut stats = RunStatistics::default();
        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            stats.record(&result.report.outcome);
            if result.cleanup_failed {
                stats.cleanup_failures += 1;
            }
            reports.push(result.report);
        }

        if self.config.delete_origin && self.config.delete_empty_dir && !self.config.test {
            stats.cleanup_failures += remove_emptied_dirs(&tasks, &reports).await;
        }

        let version_updated = self.update_version().await;

        let ledger = ledger.into_inner();
        let ledger_flushed = if ledger.is_enabled() && !self.config.test {
            match ledger.flush() {
                Ok(()) => {
                    info!(path = %ledger.path().display(), entries = ledger.len(), "[PUBLISH] Upload ledger saved");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "[PUBLISH] Failed to save upload ledger, next run loses its cache");
                    false
                }
            }
        } else {
            false
        };

        info!(
            uploaded = stats.uploaded,
            skipped_remote = stats.skipped_remote,
            skipped_ledger = stats.skipped_ledger,
            failed = stats.failed,
            dry_run = stats.dry_run,
            cleanup_failures = stats.cleanup_failures,
            "[PUBLISH] Run complete"
        );

        PublishReport {
            files: reports,
            stats,
            ledger_flushed,
            version_updated,
        }
    }

    async fn process_file(&self, index: usize, task: &FileTask, ctx: &RunContext<'_>) -> TaskResult {
        let key = resolve(task, &ctx.base_path, &self.config.dist, self.mapper.as_deref());
        let (outcome, local_deleted, cleanup_failed) = self.decide(index, task, &key, ctx).await;
        TaskResult {
            report: FileReport {
                local_path: task.local_path.clone(),
                remote_key: key,
                outcome,
                local_deleted,
            },
            cleanup_failed,
        }
    }

    async fn decide(
        &self,
        index: usize,
        task: &FileTask,
        key: &str,
        ctx: &RunContext<'_>,
    ) -> (UploadOutcome, bool, bool) {
        let config = &self.config;
        let position = format!("{}/{}", index + 1, ctx.total);

        if config.enable_memory && !config.refresh && ctx.ledger.lock().has(key) {
            debug!(key, file = %task.local_path, "[PUBLISH] Ledger hit, skipping");
            return (UploadOutcome::SkippedLedgerHit, false, false);
        }

        if !config.overwrite && !config.refresh {
            let presence = match config.on_indeterminate {
                IndeterminatePolicy::Recheck => {
                    existence::check_with_recheck(&self.store, key, ctx.max_attempts, self.backoff.as_ref())
                        .await
                }
                _ => existence::check(&self.store, key).await,
            };
            match presence {
                Presence::Present => {
                    info!(key, "[PUBLISH] Already exists in store, skipping");
                    if !config.test {
                        ctx.ledger.lock().add(key);
                    }
                    return (UploadOutcome::SkippedRemoteExists, false, false);
                }
                Presence::Absent => {
                    debug!(key, "[PUBLISH] Not present in store");
                }
                Presence::Indeterminate(e) => {
                    if config.on_indeterminate == IndeterminatePolicy::TreatAsAbsent {
                        warn!(key, error = %e, "[PUBLISH] Existence unknown, treating as absent");
                    } else {
                        error!(
                            key,
                            file = %task.local_path,
                            name = %e.name,
                            code = %e.code,
                            message = %e.message,
                            "[PUBLISH][ERROR] Existence check failed"
                        );
                        let failed = UploadOutcome::Failed {
                            kind: FailureKind::ExistenceCheck,
                            code: e.code,
                            name: e.name,
                            message: e.message,
                        };
                        return (failed, false, false);
                    }
                }
            }
        }

        if config.test {
            info!(file = %task.local_path, key, "[PUBLISH] Ready to upload (test mode)");
            return (UploadOutcome::DryRun, false, false);
        }

        if config.verbose {
            info!(progress = %position, file = %task.local_path, "[PUBLISH] Uploading");
        } else {
            debug!(progress = %position, file = %task.local_path, "[PUBLISH] Uploading");
        }

        let url = match upload_with_retry(
            &self.store,
            &task.absolute_path,
            key,
            &ctx.options,
            ctx.max_attempts,
            self.backoff.as_ref(),
        )
        .await
        {
            Ok(url) => url,
            Err(e) => {
                error!(
                    file = %task.local_path,
                    name = %e.name,
                    code = %e.code,
                    message = %e.message,
                    attempts = e.attempts,
                    "[PUBLISH][ERROR] Failed to upload"
                );
                let failed = UploadOutcome::Failed {
                    kind: FailureKind::Upload,
                    code: e.code,
                    name: e.name,
                    message: e.message,
                };
                return (failed, false, false);
            }
        };

        if config.verbose {
            info!(progress = %position, file = %task.local_path, url = %url, "[PUBLISH] Uploaded");
        }
        ctx.ledger.lock().add(key);

        let (local_deleted, cleanup_failed) = if config.delete_origin {
            match tokio::fs::remove_file(&task.absolute_path).await {
                Ok(()) => {
                    debug!(path = %task.absolute_path.display(), "[PUBLISH] Deleted local file");
                    (true, false)
                }
                Err(e) => {
                    warn!(error = %e, path = %task.absolute_path.display(), "[PUBLISH] Failed to delete local file");
                    (false, true)
                }
            }
        } else {
            (false, false)
        };

        (UploadOutcome::Uploaded { url }, local_deleted, cleanup_failed)
    }

    async fn update_version(&self) -> bool {
        let (Some(hook), Some(version)) = (&self.version_hook, &self.config.version) else {
            return false;
        };
        if self.config.test {
            return false;
        }
        match hook.set_version(version).await {
            Ok(()) => {
                info!(version = %version, "[PUBLISH] Version updated");
                true
            }
            Err(e) => {
                error!(error = %e, version = %version, "[PUBLISH][ERROR] Failed to update version");
                false
            }
        }
    }
}

/// Remove directories emptied by local deletion. A directory that still holds a
/// file of this batch which was not deleted is left alone. Returns the number of
/// failures, which are logged and otherwise ignored.
async fn remove_emptied_dirs(tasks: &[FileTask], reports: &[FileReport]) -> usize {
    let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
    let mut remaining: Vec<&Path> = Vec::new();
    for (task, report) in tasks.iter().zip(reports) {
        if report.local_deleted {
            if let Some(parent) = task.absolute_path.parent() {
                candidates.insert(parent.to_path_buf());
            }
        } else {
            remaining.push(&task.absolute_path);
        }
    }

    let mut dirs: Vec<PathBuf> = candidates.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

    let mut failures = 0;
    for dir in dirs {
        if remaining.iter().any(|p| p.starts_with(&dir)) {
            debug!(dir = %dir.display(), "[PUBLISH] Directory still referenced by the batch");
            continue;
        }
        match is_empty_dir(&dir).await {
            Ok(true) => match tokio::fs::remove_dir(&dir).await {
                Ok(()) => info!(dir = %dir.display(), "[PUBLISH] Empty directory deleted"),
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "[PUBLISH] Failed to delete empty directory");
                    failures += 1;
                }
            },
            Ok(false) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "[PUBLISH] Failed to read directory");
                failures += 1;
            }
        }
    }
    failures
}

async fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}

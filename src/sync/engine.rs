//! Mirror engine: list the bucket, walk the tree, upload, prune stragglers.

use super::batch::{dispatch_batch, partition, PendingUpload};
use super::decision::{classify_file, SyncDecision};
use super::index::RemoteObjectIndex;
use super::report::{EventKind, EventLog, ItemFailure, SyncReport};
use super::walker::{SkipReason, TreeWalker, WalkEntry};
use crate::config::{validate_inputs, SyncConfig};
use crate::error::MirrorError;
use crate::store::{AccessPolicy, ObjectMeta, ObjectStore};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    ListingRemote,
    Walking,
    FlushingUploads,
    RemovingStragglers,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ListingRemote => "LISTING_REMOTE",
            Self::Walking => "WALKING",
            Self::FlushingUploads => "FLUSHING_UPLOADS",
            Self::RemovingStragglers => "REMOVING_STRAGGLERS",
            Self::Done => "DONE",
        }
    }

    /// Forward-only transitions; flushing may be skipped.
    pub fn can_transition(from: Phase, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (from, to),
            (Idle, ListingRemote)
                | (ListingRemote, Walking)
                | (Walking, FlushingUploads)
                | (Walking, RemovingStragglers)
                | (FlushingUploads, RemovingStragglers)
                | (RemovingStragglers, Done)
        )
    }
}

pub struct TreeSync {
    source_dir: PathBuf,
    bucket: String,
    config: SyncConfig,
    store: Arc<dyn ObjectStore>,
    events: EventLog,
    phase: Phase,
    index: RemoteObjectIndex,
    pending: Vec<PendingUpload>,
    report: SyncReport,
}

impl TreeSync {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
        config: SyncConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, MirrorError> {
        let source_dir = source_dir.into();
        let bucket = bucket.into();
        validate_inputs(&source_dir, &bucket)?;
        config.validate()?;

        let events = EventLog::stdout(config.verbosity);
        let report = SyncReport {
            dry_run: config.dry_run,
            ..Default::default()
        };

        Ok(Self {
            source_dir,
            bucket,
            config,
            store,
            events,
            phase: Phase::Idle,
            index: RemoteObjectIndex::empty(),
            pending: Vec::new(),
            report,
        })
    }

    /// Replaces the default stdout event log.
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn index(&self) -> &RemoteObjectIndex {
        &self.index
    }

    pub fn pending_uploads(&self) -> &[PendingUpload] {
        &self.pending
    }

    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    pub fn into_report(mut self) -> SyncReport {
        self.events.flush();
        self.report
    }

    fn enter(&mut self, next: Phase) -> Result<(), MirrorError> {
        if !Phase::can_transition(self.phase, next) {
            return Err(MirrorError::InvalidPhase(format!(
                "{} -> {}",
                self.phase.as_str(),
                next.as_str()
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Fatal errors end the run; no later phase may start.
    fn abort(&mut self, err: MirrorError) -> MirrorError {
        log::error!("Mirror run aborted in {}: {}", self.phase.as_str(), err);
        self.phase = Phase::Done;
        err
    }

    /// Full run in phase order.
    pub async fn run(mut self) -> Result<SyncReport, MirrorError> {
        self.list_remote_objects().await?;
        self.walk().await?;
        if self.config.concurrent_uploads {
            self.flush_concurrent_uploads().await?;
        }
        self.remove_stragglers().await?;
        Ok(self.into_report())
    }

    /// Loads the bucket listing into the index. Returns the object count.
    pub async fn list_remote_objects(&mut self) -> Result<usize, MirrorError> {
        self.enter(Phase::ListingRemote)?;

        let listing = self.store.list_objects(&self.bucket).await;
        let list_err = match listing {
            Ok(objects) => {
                self.index = RemoteObjectIndex::from_listing(objects);
                return Ok(self.index.len());
            }
            Err(e) => e,
        };

        let probe = self.store.bucket_exists(&self.bucket).await;
        let exists = match probe {
            Ok(exists) => exists,
            Err(e) => return Err(self.abort(e)),
        };
        if exists {
            return Err(self.abort(list_err));
        }

        if !self.config.create_if_missing {
            let err = MirrorError::NotFound(format!(
                "Bucket {} not found or error accessing, and create-if-missing not set",
                self.bucket
            ));
            return Err(self.abort(err));
        }

        self.events.emit(
            EventKind::Notice,
            0,
            &format!("Bucket {} not found; attempting to create", self.bucket),
        );
        if !self.config.dry_run {
            let created = self.store.create_bucket(&self.bucket).await;
            if let Err(e) = created {
                return Err(self.abort(e));
            }
        }

        self.index = RemoteObjectIndex::empty();
        Ok(0)
    }

    /// Walks the source tree and classifies every file against the index.
    pub async fn walk(&mut self) -> Result<(), MirrorError> {
        self.enter(Phase::Walking)?;

        if self.config.dry_run {
            self.events.emit(
                EventKind::Notice,
                0,
                "---- NO-OP: Nothing in the bucket will be affected -----",
            );
        }

        let step = self.config.indent_step;
        for entry in TreeWalker::new(&self.source_dir, &self.config) {
            match entry {
                WalkEntry::DirScanned { path, depth } => {
                    self.report.dirs_scanned += 1;
                    self.events.emit(
                        EventKind::DirScanned,
                        depth * step,
                        &format!("Scanning local directory: {}", path.display()),
                    );
                }
                WalkEntry::DirSkipped { key, depth, reason } => {
                    self.report.dirs_skipped += 1;
                    let msg = match reason {
                        SkipReason::Excluded => format!("Skipping directory: [{}]", key),
                        SkipReason::Symlink => {
                            format!("Skipping symlinked directory: [{}]", key)
                        }
                    };
                    self.events.emit(EventKind::DirSkipped, depth * step, &msg);
                }
                WalkEntry::FileSkipped { key, depth } => {
                    self.report.files_skipped += 1;
                    self.events.emit(
                        EventKind::FileSkipped,
                        depth * step,
                        &format!("Skipping file: [{}]", key),
                    );
                }
                WalkEntry::RootUnreadable { path, error } => {
                    // Without the root listing every remote key looks like a straggler.
                    let err = MirrorError::DirectoryAccess {
                        path: path.display().to_string(),
                        reason: error,
                    };
                    return Err(self.abort(err));
                }
                WalkEntry::Unreadable { path, error, .. } => {
                    let err = MirrorError::DirectoryAccess {
                        path: path.display().to_string(),
                        reason: error,
                    };
                    if let Some(prefix) = relative_key(&self.source_dir, &path) {
                        let kept = self.index.take_subtree(&prefix);
                        if kept > 0 {
                            log::warn!("Keeping {} remote object(s) under [{}]", kept, prefix);
                        }
                    }
                    log::error!("{}, skipping", err);
                    self.report
                        .read_errors
                        .push(ItemFailure::new(path.display().to_string(), &err));
                }
                WalkEntry::File { path, key, depth } => {
                    self.handle_file(&path, &key, depth * step).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_file(&mut self, path: &Path, key: &str, indent: usize) {
        let Some(decision) = self.classify(path, key) else {
            return;
        };

        let queued = self.config.concurrent_uploads && !self.config.dry_run;
        self.events
            .emit(decision.event_kind(), indent, &decision.describe(key, queued));
        self.report.record_decision(key, decision);

        if decision.needs_upload() {
            self.upload(path, key).await;
        }
    }

    /// Stats the local file and decides against the index. `None` when the
    /// file cannot be read; its key still leaves the index so the remote
    /// copy is not pruned.
    pub fn classify(&mut self, local_path: &Path, remote_key: &str) -> Option<SyncDecision> {
        let stat = fs::metadata(local_path).and_then(|meta| Ok((meta.len(), meta.modified()?)));
        let (size, modified) = match stat {
            Ok(stat) => stat,
            Err(e) => {
                self.index.take(remote_key);
                let err = MirrorError::Io(format!(
                    "Cannot stat {}: {}",
                    local_path.display(),
                    e
                ));
                log::error!("{}", err);
                self.report.read_errors.push(ItemFailure::new(remote_key, &err));
                return None;
            }
        };

        let local = ObjectMeta::new(size, DateTime::<Utc>::from(modified));

        Some(classify_file(&mut self.index, remote_key, local))
    }

    /// Uploads now, queues for a batch, or does nothing under dry run.
    pub async fn upload(&mut self, local_path: &Path, remote_key: &str) {
        if self.config.dry_run {
            return;
        }

        if self.config.concurrent_uploads {
            self.pending.push(PendingUpload {
                local_path: local_path.to_path_buf(),
                remote_key: remote_key.to_string(),
            });
            return;
        }

        match self
            .store
            .put_object(&self.bucket, remote_key, local_path, AccessPolicy::Private)
            .await
        {
            Ok(()) => self.report.uploaded += 1,
            Err(e) => self.record_upload_failure(remote_key, e),
        }
    }

    fn record_upload_failure(&mut self, key: &str, err: MirrorError) {
        log::error!("Upload failed: [{}] {}", key, err);
        self.report.upload_failures.push(ItemFailure::new(key, &err));
    }

    /// Dispatches queued uploads `batch_size` at a time, waiting for each
    /// batch to finish before the next starts.
    pub async fn flush_concurrent_uploads(&mut self) -> Result<(), MirrorError> {
        self.enter(Phase::FlushingUploads)?;

        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        let batches = partition(pending, self.config.batch_size);
        let total = batches.len();

        for (n, batch) in batches.into_iter().enumerate() {
            let keys: Vec<String> = batch.iter().map(|u| u.remote_key.clone()).collect();
            for key in &keys {
                self.events.emit(
                    EventKind::Notice,
                    0,
                    &format!("Spawning upload to bucket: [{}]", key),
                );
            }
            self.events.emit(
                EventKind::Notice,
                0,
                &format!(
                    "Waiting for batch {}/{}: [{}]",
                    n + 1,
                    total,
                    keys.join(",")
                ),
            );
            self.report.batches.push(keys);

            let results = dispatch_batch(Arc::clone(&self.store), &self.bucket, batch).await;
            for (key, result) in results {
                match result {
                    Ok(()) => self.report.uploaded += 1,
                    Err(e) => self.record_upload_failure(&key, e),
                }
            }
        }

        Ok(())
    }

    /// Deletes (or only reports, with `keep_stragglers`) every key the walk
    /// did not match. Returns the straggler count.
    pub async fn remove_stragglers(&mut self) -> Result<usize, MirrorError> {
        self.enter(Phase::RemovingStragglers)?;

        let stragglers = self.index.drain_stragglers();
        let count = stragglers.len();

        if self.config.keep_stragglers {
            self.events.emit(
                EventKind::Notice,
                0,
                &format!(
                    "{} file(s) detected in bucket that do not exist on filesystem:",
                    count
                ),
            );
            for key in &stragglers {
                self.events.emit(EventKind::StragglerKept, 2, key);
            }
            self.events.emit(EventKind::Notice, 0, "--- END OF LIST ---");
        } else {
            for key in &stragglers {
                self.events.emit(
                    EventKind::StragglerDeleted,
                    0,
                    &format!("Deleting object from bucket: [{}]", key),
                );
                if self.config.dry_run {
                    continue;
                }
                match self.store.delete_object(&self.bucket, key).await {
                    Ok(()) => self.report.deleted += 1,
                    Err(e) => {
                        log::error!("Delete failed: [{}] {}", key, e);
                        self.report.delete_failures.push(ItemFailure::new(key.as_str(), &e));
                    }
                }
            }
        }

        self.report.stragglers = stragglers;
        self.enter(Phase::Done)?;
        Ok(count)
    }
}

/// Bucket key for a path under `root`, `None` outside the root or for
/// non UTF-8 components.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let parts = path
        .strip_prefix(root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    (!parts.is_empty()).then(|| parts.join("/"))
}

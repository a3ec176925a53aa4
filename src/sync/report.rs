//! Run events and the end-of-run summary.

use super::decision::SyncDecision;
use crate::error::{MirrorError, MirrorErrorDto};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

pub const LOG_FILE_MOD: u8 = 1;
pub const LOG_FILE_ALL: u8 = 2;
pub const LOG_SCAN_DIR: u8 = 3;
pub const LOG_SKIP_DIR: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewFile,
    StaleMtime,
    StaleSize,
    Unchanged,
    DirScanned,
    DirSkipped,
    FileSkipped,
    StragglerDeleted,
    StragglerKept,
    Notice,
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NewFile => "new-file",
            Self::StaleMtime => "stale-mtime",
            Self::StaleSize => "stale-size",
            Self::Unchanged => "unchanged",
            Self::DirScanned => "dir-scanned",
            Self::DirSkipped => "dir-skipped",
            Self::FileSkipped => "file-skipped",
            Self::StragglerDeleted => "straggler-deleted",
            Self::StragglerKept => "straggler-kept",
            Self::Notice => "notice",
        }
    }

    /// Minimum verbosity at which this event is printed.
    pub fn level(&self) -> u8 {
        match self {
            Self::NewFile
            | Self::StaleMtime
            | Self::StaleSize
            | Self::StragglerDeleted
            | Self::StragglerKept
            | Self::Notice => LOG_FILE_MOD,
            Self::Unchanged => LOG_FILE_ALL,
            Self::DirScanned => LOG_SCAN_DIR,
            Self::DirSkipped | Self::FileSkipped => LOG_SKIP_DIR,
        }
    }
}

/// Timestamped, verbosity-gated event lines.
pub struct EventLog {
    verbosity: u8,
    out: Box<dyn Write + Send>,
}

impl EventLog {
    pub fn new(verbosity: u8, out: Box<dyn Write + Send>) -> Self {
        Self { verbosity, out }
    }

    pub fn stdout(verbosity: u8) -> Self {
        Self::new(verbosity, Box::new(io::stdout()))
    }

    /// Log that writes into a buffer the caller can read back.
    pub fn buffered(verbosity: u8) -> (Self, SharedBuffer) {
        let buf = SharedBuffer::default();
        (Self::new(verbosity, Box::new(buf.clone())), buf)
    }

    pub fn enabled(&self, kind: EventKind) -> bool {
        self.verbosity >= kind.level()
    }

    /// `indent` counts two-space units.
    pub fn emit(&mut self, kind: EventKind, indent: usize, msg: &str) {
        if !self.enabled(kind) {
            return;
        }
        let line = format!(
            "{} {}[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "  ".repeat(indent),
            kind.tag(),
            msg
        );
        if let Err(e) = self.out.write_all(line.as_bytes()) {
            log::warn!("Event log write failed: {}", e);
        }
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let data = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&data).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDecision {
    pub key: String,
    pub decision: SyncDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: MirrorErrorDto,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, error: &MirrorError) -> Self {
        Self {
            item: item.into(),
            error: error.to_serde(),
        }
    }
}

/// Summary of a mirror run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub new_files: usize,
    pub stale_mtime: usize,
    pub stale_size: usize,
    pub unchanged: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub dirs_scanned: usize,
    pub dirs_skipped: usize,
    pub files_skipped: usize,
    pub decisions: Vec<FileDecision>,
    pub stragglers: Vec<String>,
    pub batches: Vec<Vec<String>>,
    pub read_errors: Vec<ItemFailure>,
    pub upload_failures: Vec<ItemFailure>,
    pub delete_failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn record_decision(&mut self, key: &str, decision: SyncDecision) {
        match decision {
            SyncDecision::UploadNew => self.new_files += 1,
            SyncDecision::UploadStaleMtime => self.stale_mtime += 1,
            SyncDecision::UploadStaleSize => self.stale_size += 1,
            SyncDecision::Skip => self.unchanged += 1,
        }
        self.decisions.push(FileDecision {
            key: key.to_string(),
            decision,
        });
    }

    pub fn decision_for(&self, key: &str) -> Option<SyncDecision> {
        self.decisions
            .iter()
            .find(|d| d.key == key)
            .map(|d| d.decision)
    }

    pub fn upload_candidates(&self) -> usize {
        self.new_files + self.stale_mtime + self.stale_size
    }

    /// Upload or delete failures; unreadable directories do not count.
    pub fn has_failures(&self) -> bool {
        !self.upload_failures.is_empty() || !self.delete_failures.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            2
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_below_verbosity_are_dropped() {
        let (mut log, buf) = EventLog::buffered(1);
        log.emit(EventKind::NewFile, 0, "New file: [a]");
        log.emit(EventKind::Unchanged, 0, "No change, file skipped: [b]");
        log.emit(EventKind::DirScanned, 0, "Scanning local directory: /tmp");
        let lines = buf.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("[new-file] New file: [a]"));
    }

    #[test]
    fn quiet_log_prints_nothing() {
        let (mut log, buf) = EventLog::buffered(0);
        log.emit(EventKind::Notice, 0, "hello");
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn indent_is_two_spaces_per_unit() {
        let (mut log, buf) = EventLog::buffered(4);
        log.emit(EventKind::DirSkipped, 2, "Skipping directory: [.svn]");
        let line = &buf.lines()[0];
        // "YYYY-MM-DD HH:MM:SS " is 20 chars
        assert_eq!(&line[20..], "    [dir-skipped] Skipping directory: [.svn]");
    }

    #[test]
    fn failures_drive_exit_code() {
        let mut report = SyncReport::default();
        assert_eq!(report.exit_code(), 0);
        report.read_errors.push(ItemFailure::new(
            "/x",
            &MirrorError::DirectoryAccess {
                path: "/x".into(),
                reason: "denied".into(),
            },
        ));
        assert_eq!(report.exit_code(), 0);
        report.upload_failures.push(ItemFailure::new(
            "a",
            &MirrorError::Upload {
                key: "a".into(),
                reason: "boom".into(),
            },
        ));
        assert_eq!(report.exit_code(), 2);
    }
}

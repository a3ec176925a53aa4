//! Per-file upload decision

use super::index::RemoteObjectIndex;
use super::report::EventKind;
use crate::store::ObjectMeta;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDecision {
    UploadNew,
    UploadStaleMtime,
    UploadStaleSize,
    Skip,
}

impl SyncDecision {
    pub fn needs_upload(&self) -> bool {
        !matches!(self, Self::Skip)
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            Self::UploadNew => EventKind::NewFile,
            Self::UploadStaleMtime => EventKind::StaleMtime,
            Self::UploadStaleSize => EventKind::StaleSize,
            Self::Skip => EventKind::Unchanged,
        }
    }

    /// Log line for this decision. `queued` is true when the upload is
    /// deferred to a concurrent batch.
    pub fn describe(&self, key: &str, queued: bool) -> String {
        let action = if queued { "" } else { ", uploading" };
        match self {
            Self::UploadNew => format!("New file{}: [{}]", action, key),
            Self::UploadStaleMtime => format!("Modification time changed{}: [{}]", action, key),
            Self::UploadStaleSize => format!("File size changed{}: [{}]", action, key),
            Self::Skip => format!("No change, file skipped: [{}]", key),
        }
    }
}

/// Decides what to do with one local file and consumes its index entry.
///
/// A newer local mtime wins over size; equal-or-older mtime with a size
/// difference still uploads. Both timestamps are whole seconds.
pub fn classify_file(
    index: &mut RemoteObjectIndex,
    remote_key: &str,
    local: ObjectMeta,
) -> SyncDecision {
    match index.take(remote_key) {
        None => SyncDecision::UploadNew,
        Some(remote) if local.modified > remote.modified => SyncDecision::UploadStaleMtime,
        Some(remote) if local.size != remote.size => SyncDecision::UploadStaleSize,
        Some(_) => SyncDecision::Skip,
    }
}

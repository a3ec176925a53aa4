//! Depth-first walk of the local tree on top of `walkdir`, mapped to the
//! entries the sync engine logs and classifies.

use crate::config::SyncConfig;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    Symlink,
}

#[derive(Debug)]
pub enum WalkEntry {
    /// A directory was opened; its entries follow.
    DirScanned { path: PathBuf, depth: usize },
    /// A directory that is not descended.
    DirSkipped {
        key: String,
        depth: usize,
        reason: SkipReason,
    },
    /// A file excluded by name.
    FileSkipped { key: String, depth: usize },
    /// The source root could not be opened or listed.
    RootUnreadable { path: PathBuf, error: String },
    /// A directory or entry that could not be read; its subtree is absent.
    Unreadable {
        path: PathBuf,
        depth: usize,
        error: String,
    },
    File {
        path: PathBuf,
        key: String,
        depth: usize,
    },
}

pub struct TreeWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    rules: SyncConfig,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>, config: &SyncConfig) -> Self {
        let root = root.into();
        let inner = WalkDir::new(&root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();
        Self {
            root,
            inner,
            rules: config.clone(),
        }
    }

    /// Bucket key for an entry: its path below the root joined with `/`.
    /// `None` when a component is not valid UTF-8.
    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    fn map_entry(&mut self, entry: DirEntry) -> WalkEntry {
        let path = entry.path().to_path_buf();
        let file_type = entry.file_type();

        if entry.depth() == 0 {
            if file_type.is_dir() {
                return WalkEntry::DirScanned { path, depth: 0 };
            }
            return WalkEntry::RootUnreadable {
                path,
                error: "not a directory".to_string(),
            };
        }

        // Entries sit one level below the directory that lists them.
        let depth = entry.depth() - 1;
        let (Some(name), Some(key)) = (entry.file_name().to_str(), self.key_for(&path)) else {
            if file_type.is_dir() {
                self.inner.skip_current_dir();
            }
            log::warn!("Skipping non UTF-8 path: {}", path.display());
            return WalkEntry::Unreadable {
                path,
                depth,
                error: "file name is not valid UTF-8".to_string(),
            };
        };

        if file_type.is_dir() {
            if self.rules.is_skipped_dir(name) {
                self.inner.skip_current_dir();
                return WalkEntry::DirSkipped {
                    key,
                    depth,
                    reason: SkipReason::Excluded,
                };
            }
            return WalkEntry::DirScanned {
                path,
                depth: entry.depth(),
            };
        }

        if file_type.is_symlink() && path.is_dir() {
            return WalkEntry::DirSkipped {
                key,
                depth,
                reason: SkipReason::Symlink,
            };
        }

        if self.rules.is_skipped_file(name) {
            return WalkEntry::FileSkipped { key, depth };
        }

        WalkEntry::File { path, key, depth }
    }
}

impl Iterator for TreeWalker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        match self.inner.next()? {
            Ok(entry) => Some(self.map_entry(entry)),
            Err(e) if e.depth() == 0 => Some(WalkEntry::RootUnreadable {
                path: self.root.clone(),
                error: e.to_string(),
            }),
            Err(e) => Some(WalkEntry::Unreadable {
                path: e.path().unwrap_or(self.root.as_path()).to_path_buf(),
                depth: e.depth(),
                error: e.to_string(),
            }),
        }
    }
}

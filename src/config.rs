//! Run configuration: sync options, store connection settings and the
//! optional JSON config file.

use crate::error::MirrorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_VERBOSITY: u8 = 4;
pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_INDENT_STEP: usize = 1;

/// Options that shape a single mirror run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 0=quiet, 1=modified files, 2=all files, 3=scanned dirs, 4=skipped dirs
    pub verbosity: u8,
    /// Indent added per directory level, in units of two spaces.
    pub indent_step: usize,
    pub keep_stragglers: bool,
    pub create_if_missing: bool,
    pub concurrent_uploads: bool,
    pub batch_size: usize,
    pub dry_run: bool,
    pub skip_dirs: Vec<String>,
    pub skip_file_prefixes: Vec<String>,
    pub skip_file_suffixes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            indent_step: DEFAULT_INDENT_STEP,
            keep_stragglers: false,
            create_if_missing: false,
            concurrent_uploads: false,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            skip_dirs: vec![".svn".to_string(), ".git".to_string()],
            skip_file_prefixes: Vec::new(),
            skip_file_suffixes: vec![".swp".to_string()],
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.verbosity > MAX_VERBOSITY {
            return Err(MirrorError::Configuration(format!(
                "Invalid verbosity level {} (expected 0-{})",
                self.verbosity, MAX_VERBOSITY
            )));
        }
        if self.batch_size == 0 {
            return Err(MirrorError::Configuration(
                "Batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_skipped_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }

    pub fn is_skipped_file(&self, name: &str) -> bool {
        self.skip_file_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.skip_file_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }
}

/// Connection settings for the S3 store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Custom endpoint for MinIO, R2, OSS and friends.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub force_path_style: bool,
}

/// Shape of the `--config` JSON file. Every field is optional; CLI flags win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub source_dir: Option<PathBuf>,
    pub bucket: Option<String>,
    pub store: StoreSettings,
    pub sync: SyncConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, MirrorError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            MirrorError::Configuration(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, MirrorError> {
        let cfg: FileConfig = serde_json::from_str(raw)?;
        Ok(cfg)
    }
}

/// Checks the required run inputs before anything touches the store.
pub fn validate_inputs(source_dir: &Path, bucket: &str) -> Result<(), MirrorError> {
    if source_dir.as_os_str().is_empty() {
        return Err(MirrorError::Configuration(
            "Source directory not specified".to_string(),
        ));
    }
    if !source_dir.is_dir() {
        return Err(MirrorError::Configuration(format!(
            "Source directory {} does not exist or is not a directory",
            source_dir.display()
        )));
    }
    if bucket.trim().is_empty() {
        return Err(MirrorError::Configuration("Bucket not specified".to_string()));
    }
    Ok(())
}

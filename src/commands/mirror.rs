//! `s3mirror` command: flag parsing, config merging and the run itself

use crate::config::{FileConfig, StoreSettings, SyncConfig};
use crate::error::MirrorError;
use crate::store::{ObjectStore, S3Store};
use crate::sync::{SyncReport, TreeSync};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "s3mirror")]
#[command(version)]
#[command(about = "Makes an exact replica (mirror) of a directory tree in an S3 bucket")]
#[command(long_about = r#"
Makes an exact replica (mirror) of a directory tree in an S3 bucket.
When done, the bucket will exactly match the directory tree (unless -k).

Credentials come from the standard AWS chain, or from --access-key /
--secret-key (S3MIRROR_ACCESS_KEY / S3MIRROR_SECRET_KEY) with --endpoint.

Examples:
  s3mirror -s ./site -b my-bucket -v1         Mirror, log modified files
  s3mirror -s ./site -b my-bucket -n -v2      Show what would change
  s3mirror -s ./site -b my-bucket -t -z 8     Upload 8 files at a time
"#)]
pub struct Cli {
    /// Local source directory
    #[arg(short = 's', long = "source")]
    pub source: Option<PathBuf>,

    /// Bucket with which to sync
    #[arg(short = 'b', long)]
    pub bucket: Option<String>,

    /// 0=quiet, 1=files modified, 2=all files, 3=scanned dirs, 4=skipped dirs
    #[arg(short = 'v', long)]
    pub verbosity: Option<u8>,

    /// Indent per directory level: 0=no nesting, 1=2 spaces, 2=4 spaces, etc.
    #[arg(short = 'i', long)]
    pub indent: Option<usize>,

    /// Keep bucket objects that are NOT on the filesystem (default deletes them)
    #[arg(short = 'k', long = "keep")]
    pub keep: bool,

    /// Create the bucket if it does not exist, otherwise error
    #[arg(short = 'c', long = "create")]
    pub create: bool,

    /// Upload several files at the same time
    #[arg(short = 't', long = "concurrent")]
    pub concurrent: bool,

    /// With -t, how many uploads run at once
    #[arg(short = 'z', long = "batch-size")]
    pub batch_size: Option<usize>,

    /// No-op: don't change anything, but show what WOULD be done
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory name to skip (repeatable, added to the defaults)
    #[arg(long = "skip-dir")]
    pub skip_dirs: Vec<String>,

    /// Custom S3 endpoint (MinIO, R2, OSS)
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    /// Use path-style addressing (needed by MinIO)
    #[arg(long)]
    pub path_style: bool,

    #[arg(long, env = "S3MIRROR_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "S3MIRROR_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Everything a run needs once flags and the config file are merged.
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub source_dir: PathBuf,
    pub bucket: String,
    pub sync: SyncConfig,
    pub store: StoreSettings,
    pub credentials: Option<(String, String)>,
}

impl Cli {
    pub fn resolve(self) -> Result<ResolvedRun, MirrorError> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let source_dir = self
            .source
            .or(file.source_dir)
            .ok_or_else(|| MirrorError::Configuration("Source directory not specified".into()))?;
        let bucket = self
            .bucket
            .or(file.bucket)
            .ok_or_else(|| MirrorError::Configuration("Bucket not specified".into()))?;

        let mut sync = file.sync;
        if let Some(v) = self.verbosity {
            sync.verbosity = v;
        }
        if let Some(i) = self.indent {
            sync.indent_step = i;
        }
        if let Some(z) = self.batch_size {
            sync.batch_size = z;
        }
        sync.keep_stragglers |= self.keep;
        sync.create_if_missing |= self.create;
        sync.concurrent_uploads |= self.concurrent;
        sync.dry_run |= self.dry_run;
        for dir in self.skip_dirs {
            if !sync.skip_dirs.contains(&dir) {
                sync.skip_dirs.push(dir);
            }
        }
        sync.validate()?;

        let store = StoreSettings {
            endpoint: self.endpoint.or(file.store.endpoint),
            region: self.region.or(file.store.region),
            force_path_style: self.path_style || file.store.force_path_style,
        };

        let credentials = match (self.access_key, self.secret_key) {
            (Some(access), Some(secret)) => Some((access, secret)),
            (None, None) => None,
            _ => {
                return Err(MirrorError::Configuration(
                    "Access key and secret key must be given together".into(),
                ))
            }
        };
        if store.endpoint.is_some() && credentials.is_none() {
            return Err(MirrorError::Configuration(
                "A custom endpoint needs an access key and secret key".into(),
            ));
        }

        Ok(ResolvedRun {
            source_dir,
            bucket,
            sync,
            store,
            credentials,
        })
    }
}

pub async fn build_store(run: &ResolvedRun) -> Arc<dyn ObjectStore> {
    match (&run.store.endpoint, &run.credentials) {
        (Some(endpoint), Some((access, secret))) => Arc::new(
            S3Store::new_with_endpoint(&run.store, endpoint.clone(), access.clone(), secret.clone())
                .await,
        ),
        _ => Arc::new(S3Store::new(&run.store).await),
    }
}

/// Mirrors `run.source_dir` into `run.bucket` through `store`.
pub async fn cmd_mirror(
    run: ResolvedRun,
    store: Arc<dyn ObjectStore>,
) -> Result<SyncReport, MirrorError> {
    log::info!(
        "Mirroring {} -> {} (dry_run={})",
        run.source_dir.display(),
        run.bucket,
        run.sync.dry_run
    );

    let started = std::time::Instant::now();
    let report = TreeSync::new(run.source_dir, run.bucket, run.sync, store)?
        .run()
        .await?;

    log::info!(
        "Mirror completed in {:.2?}: {} uploaded, {} deleted, {} stragglers",
        started.elapsed(),
        report.uploaded,
        report.deleted,
        report.stragglers.len()
    );

    Ok(report)
}

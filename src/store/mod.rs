//! Object store seam used by the mirror run

pub mod memory;
pub mod s3_client;

pub use memory::{MemoryStore, PutTrace};
pub use s3_client::S3Store;

use crate::error::MirrorError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::Path;

/// Size and last-modified time of a stored object, at whole-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl ObjectMeta {
    pub fn new(size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            size,
            modified: truncate_to_secs(modified),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub meta: ObjectMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessPolicy {
    Private,
}

/// Drops sub-second precision; stores only keep whole seconds.
pub fn truncate_to_secs(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full listing of the bucket, every page.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ListedObject>, MirrorError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MirrorError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), MirrorError>;

    /// `Ok(None)` when the key does not exist.
    async fn get_metadata(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectMeta>, MirrorError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        policy: AccessPolicy,
    ) -> Result<(), MirrorError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), MirrorError>;
}

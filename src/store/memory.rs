//! In-process object store. Backs the integration tests and lets a
//! mirror run be exercised without network access.

use super::{AccessPolicy, ListedObject, ObjectMeta, ObjectStore};
use crate::error::MirrorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Order in which puts started and finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutTrace {
    Started(String),
    Finished(String),
}

#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, ObjectMeta>>>,
    mutations: AtomicUsize,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    failing_list: Mutex<bool>,
    put_delay: Mutex<Option<Duration>>,
    trace: Mutex<Vec<PutTrace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one empty bucket.
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        lock(&store.buckets).insert(bucket.to_string(), BTreeMap::new());
        store
    }

    /// Seeds an object without counting it as a mutation.
    pub fn insert(&self, bucket: &str, key: &str, size: u64, modified: DateTime<Utc>) {
        lock(&self.buckets)
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), ObjectMeta::new(size, modified));
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.buckets)
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        lock(&self.buckets).contains_key(bucket)
    }

    /// Number of calls that changed (or tried to change) store state.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn fail_put(&self, key: &str) {
        lock(&self.failing_puts).insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        lock(&self.failing_deletes).insert(key.to_string());
    }

    /// Makes listing fail even though the bucket exists.
    pub fn fail_list(&self) {
        *lock(&self.failing_list) = true;
    }

    pub fn set_put_delay(&self, delay: Duration) {
        *lock(&self.put_delay) = Some(delay);
    }

    pub fn put_trace(&self) -> Vec<PutTrace> {
        lock(&self.trace).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ListedObject>, MirrorError> {
        if *lock(&self.failing_list) {
            return Err(MirrorError::Store("list failed: access denied".to_string()));
        }
        let buckets = lock(&self.buckets);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| MirrorError::Store(format!("NoSuchBucket: {}", bucket)))?;
        Ok(objects
            .iter()
            .map(|(key, meta)| ListedObject {
                key: key.clone(),
                meta: *meta,
            })
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MirrorError> {
        Ok(self.has_bucket(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), MirrorError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        lock(&self.buckets).entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, MirrorError> {
        Ok(lock(&self.buckets)
            .get(bucket)
            .and_then(|objects| objects.get(key).copied()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        _policy: AccessPolicy,
    ) -> Result<(), MirrorError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        lock(&self.trace).push(PutTrace::Started(key.to_string()));

        let delay = *lock(&self.put_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.store_file(bucket, key, local_path).await;
        lock(&self.trace).push(PutTrace::Finished(key.to_string()));
        result
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), MirrorError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_deletes).contains(key) {
            return Err(MirrorError::Delete {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if let Some(objects) = lock(&self.buckets).get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}

impl MemoryStore {
    async fn store_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), MirrorError> {
        if lock(&self.failing_puts).contains(key) {
            return Err(MirrorError::Upload {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| MirrorError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })?
            .len();

        let mut buckets = lock(&self.buckets);
        let objects = buckets.get_mut(bucket).ok_or_else(|| MirrorError::Upload {
            key: key.to_string(),
            reason: format!("NoSuchBucket: {}", bucket),
        })?;
        objects.insert(key.to_string(), ObjectMeta::new(size, Utc::now()));
        Ok(())
    }
}

//! Bounded concurrent uploads, one barrier per batch.

use crate::error::MirrorError;
use crate::store::{AccessPolicy, ObjectStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// Splits the queue into batches of at most `batch_size`; the last may be smaller.
pub fn partition(pending: Vec<PendingUpload>, batch_size: usize) -> Vec<Vec<PendingUpload>> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(pending.len().div_ceil(size));
    let mut iter = pending.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

/// Runs every upload in `batch` concurrently and returns once all of them
/// have finished. A failure never cancels its siblings.
pub async fn dispatch_batch(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    batch: Vec<PendingUpload>,
) -> Vec<(String, Result<(), MirrorError>)> {
    let keys: Vec<String> = batch.iter().map(|u| u.remote_key.clone()).collect();
    let mut set = JoinSet::new();

    for upload in batch {
        let store = Arc::clone(&store);
        let bucket = bucket.to_string();
        set.spawn(async move {
            let result = store
                .put_object(
                    &bucket,
                    &upload.remote_key,
                    &upload.local_path,
                    AccessPolicy::Private,
                )
                .await;
            (upload.remote_key, result)
        });
    }

    let mut results = Vec::with_capacity(keys.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => results.push(outcome),
            Err(e) => log::error!("Upload task panicked: {}", e),
        }
    }

    // Keys with no outcome belong to tasks that panicked.
    let finished: HashSet<String> = results.iter().map(|(k, _)| k.clone()).collect();
    for key in keys.into_iter().filter(|k| !finished.contains(k)) {
        results.push((
            key.clone(),
            Err(MirrorError::Upload {
                key,
                reason: "upload task panicked".to_string(),
            }),
        ));
    }

    results
}

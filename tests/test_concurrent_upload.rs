//! Batched concurrent uploads: batch sizes and the per-batch barrier

use mirror_lib::config::SyncConfig;
use mirror_lib::store::{MemoryStore, ObjectStore, PutTrace};
use mirror_lib::sync::{EventLog, Phase, TreeSync};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const BUCKET: &str = "batch-test";

fn tree_with_files(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    for i in 0..n {
        let rel = if i % 2 == 0 {
            format!("file-{}.txt", i)
        } else {
            format!("nested/file-{}.txt", i)
        };
        fs::write(dir.path().join(rel), format!("payload {}", i)).unwrap();
    }
    dir
}

fn concurrent_config(batch_size: usize) -> SyncConfig {
    SyncConfig {
        concurrent_uploads: true,
        batch_size,
        ..Default::default()
    }
}

fn index_of(trace: &[PutTrace], wanted: &PutTrace) -> usize {
    trace.iter().position(|t| t == wanted).unwrap()
}

/// Highest number of puts in flight at any point of the trace.
fn max_in_flight(trace: &[PutTrace]) -> usize {
    let mut current = 0usize;
    let mut max = 0usize;
    for event in trace {
        match event {
            PutTrace::Started(_) => {
                current += 1;
                max = max.max(current);
            }
            PutTrace::Finished(_) => current -= 1,
        }
    }
    max
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_uploads_run_as_two_two_one() {
    let dir = tree_with_files(5);
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    store.set_put_delay(Duration::from_millis(30));
    let dyn_store: Arc<dyn ObjectStore> = store.clone();

    let mut sync = TreeSync::new(dir.path(), BUCKET, concurrent_config(2), dyn_store).unwrap();
    sync.list_remote_objects().await.unwrap();
    sync.walk().await.unwrap();

    // Queued, nothing sent yet.
    assert_eq!(sync.pending_uploads().len(), 5);
    assert_eq!(store.mutation_count(), 0);

    sync.flush_concurrent_uploads().await.unwrap();
    assert_eq!(sync.phase(), Phase::FlushingUploads);
    assert!(sync.pending_uploads().is_empty());

    let report = sync.report().clone();
    let sizes: Vec<usize> = report.batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(report.uploaded, 5);

    let trace = store.put_trace();
    assert_eq!(trace.len(), 10);
    assert!(max_in_flight(&trace) <= 2);

    // Every put of batch N finishes before any put of batch N+1 starts.
    for pair in report.batches.windows(2) {
        let last_finish = pair[0]
            .iter()
            .map(|k| index_of(&trace, &PutTrace::Finished(k.clone())))
            .max()
            .unwrap();
        let first_start = pair[1]
            .iter()
            .map(|k| index_of(&trace, &PutTrace::Started(k.clone())))
            .min()
            .unwrap();
        assert!(last_finish < first_start, "batch barrier violated: {:?}", trace);
    }

    let all: HashSet<String> = report.batches.iter().flatten().cloned().collect();
    assert_eq!(all.len(), 5);
    assert_eq!(store.keys(BUCKET).len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_members_overlap() {
    let dir = tree_with_files(3);
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    store.set_put_delay(Duration::from_millis(200));
    let dyn_store: Arc<dyn ObjectStore> = store.clone();

    TreeSync::new(dir.path(), BUCKET, concurrent_config(3), dyn_store)
        .unwrap()
        .run()
        .await
        .unwrap();

    let trace = store.put_trace();
    assert_eq!(max_in_flight(&trace), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_upload_does_not_cancel_siblings() {
    let dir = tree_with_files(4);
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    store.fail_put("file-0.txt");
    let dyn_store: Arc<dyn ObjectStore> = store.clone();

    let report = TreeSync::new(dir.path(), BUCKET, concurrent_config(4), dyn_store)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.batches.len(), 1);
    assert_eq!(report.uploaded, 3);
    assert_eq!(report.upload_failures.len(), 1);
    assert_eq!(report.upload_failures[0].item, "file-0.txt");
    assert_eq!(store.keys(BUCKET).len(), 3);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn dry_run_queues_nothing() {
    let dir = tree_with_files(4);
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let dyn_store: Arc<dyn ObjectStore> = store.clone();
    let config = SyncConfig {
        dry_run: true,
        ..concurrent_config(2)
    };

    let report = TreeSync::new(dir.path(), BUCKET, config, dyn_store)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(report.batches.is_empty());
    assert_eq!(report.upload_candidates(), 4);
    assert_eq!(store.mutation_count(), 0);
}

#[tokio::test]
async fn batch_progress_is_logged() {
    let dir = tree_with_files(3);
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let dyn_store: Arc<dyn ObjectStore> = store.clone();
    let (log, buf) = EventLog::buffered(1);

    TreeSync::new(dir.path(), BUCKET, concurrent_config(2), dyn_store)
        .unwrap()
        .with_event_log(log)
        .run()
        .await
        .unwrap();

    let out = buf.contents();
    assert_eq!(out.matches("Spawning upload to bucket:").count(), 3);
    assert!(out.contains("Waiting for batch 1/2:"));
    assert!(out.contains("Waiting for batch 2/2:"));
    // Queued decisions do not claim an upload is happening yet.
    assert!(out.contains("[new-file] New file: ["));
    assert!(!out.contains("uploading"));
}

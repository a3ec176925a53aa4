//! Optional MinIO integration tests for the S3 store.
//! Run only when MIRROR_MINIO_TEST=1 is set.

use mirror_lib::config::{StoreSettings, SyncConfig};
use mirror_lib::store::{AccessPolicy, ObjectStore, S3Store};
use mirror_lib::sync::TreeSync;
use std::env;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MinioTestConfig {
    endpoint: String,
    access_key: String,
    secret_key: String,
    bucket_prefix: String,
}

impl MinioTestConfig {
    fn from_env() -> Option<Self> {
        if env::var("MIRROR_MINIO_TEST").ok().as_deref() != Some("1") {
            return None;
        }

        Some(Self {
            endpoint: required_with_fallback("MIRROR_TEST_S3_ENDPOINT", "S3MIRROR_ENDPOINT"),
            access_key: required_with_fallback("MIRROR_TEST_S3_ACCESS_KEY", "S3MIRROR_ACCESS_KEY"),
            secret_key: required_with_fallback("MIRROR_TEST_S3_SECRET_KEY", "S3MIRROR_SECRET_KEY"),
            bucket_prefix: env::var("MIRROR_TEST_BUCKET_PREFIX")
                .unwrap_or_else(|_| "s3mirror-test".to_string()),
        })
    }

    /// Fresh bucket name per test so straggler removal never touches real data.
    fn isolated_bucket(&self) -> String {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        format!("{}-{}", self.bucket_prefix, suffix)
    }
}

fn required_with_fallback(primary: &str, fallback: &str) -> String {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .unwrap_or_else(|_| panic!("Missing env var: {} (or fallback {})", primary, fallback))
}

async fn make_store(cfg: &MinioTestConfig) -> Arc<S3Store> {
    let settings = StoreSettings {
        endpoint: Some(cfg.endpoint.clone()),
        region: None,
        force_path_style: true,
    };
    Arc::new(
        S3Store::new_with_endpoint(
            &settings,
            cfg.endpoint.clone(),
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
        )
        .await,
    )
}

#[tokio::test]
async fn minio_smoke_put_head_delete() {
    let Some(cfg) = MinioTestConfig::from_env() else {
        eprintln!("skip minio_smoke_put_head_delete: MIRROR_MINIO_TEST != 1");
        return;
    };

    let store = make_store(&cfg).await;
    let bucket = cfg.isolated_bucket();
    assert!(!store.bucket_exists(&bucket).await.expect("head bucket"));
    store.create_bucket(&bucket).await.expect("create bucket");
    assert!(store.bucket_exists(&bucket).await.expect("head bucket"));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hello.txt");
    fs::write(&path, b"s3mirror-minio-smoke").unwrap();

    store
        .put_object(&bucket, "dir/hello.txt", &path, AccessPolicy::Private)
        .await
        .expect("put smoke object");

    let meta = store
        .get_metadata(&bucket, "dir/hello.txt")
        .await
        .expect("head smoke object")
        .expect("uploaded object should exist");
    assert_eq!(meta.size, 20);

    let listed = store.list_objects(&bucket).await.expect("list bucket");
    assert!(listed.iter().any(|o| o.key == "dir/hello.txt"));

    store
        .delete_object(&bucket, "dir/hello.txt")
        .await
        .expect("delete smoke object");
    assert!(store
        .get_metadata(&bucket, "dir/hello.txt")
        .await
        .expect("head after delete")
        .is_none());
}

#[tokio::test]
async fn minio_mirror_is_idempotent() {
    let Some(cfg) = MinioTestConfig::from_env() else {
        eprintln!("skip minio_mirror_is_idempotent: MIRROR_MINIO_TEST != 1");
        return;
    };

    let store = make_store(&cfg).await;
    let dyn_store: Arc<dyn ObjectStore> = store.clone();
    let bucket = cfg.isolated_bucket();

    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
    fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();

    let config = SyncConfig {
        create_if_missing: true,
        concurrent_uploads: true,
        batch_size: 2,
        ..Default::default()
    };

    let first = TreeSync::new(dir.path(), bucket.clone(), config.clone(), dyn_store.clone())
        .unwrap()
        .run()
        .await
        .expect("first mirror run");
    assert_eq!(first.uploaded, 2);

    fs::remove_file(dir.path().join("assets/app.js")).unwrap();

    let second = TreeSync::new(dir.path(), bucket.clone(), config, dyn_store)
        .unwrap()
        .run()
        .await
        .expect("second mirror run");
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.deleted, 1);

    let keys: Vec<String> = store
        .list_objects(&bucket)
        .await
        .expect("list bucket")
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(keys, vec!["index.html".to_string()]);

    // Best-effort cleanup.
    for key in keys {
        let _ = store.delete_object(&bucket, &key).await;
    }
}

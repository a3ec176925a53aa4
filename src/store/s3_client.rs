//! S3 client wrapper for mirror operations

use super::{truncate_to_secs, AccessPolicy, ListedObject, ObjectMeta, ObjectStore};
use crate::config::StoreSettings;
use crate::error::MirrorError;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::Client;
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::time::Instant;

pub struct S3Store {
    client: Client,
    region: Option<String>,
}

impl S3Store {
    /// Create client with AWS credentials from environment
    pub async fn new(settings: &StoreSettings) -> Self {
        let region_provider = match &settings.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider(),
        }
        .or_else("us-east-1");
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.force_path_style)
            .build();

        Self {
            region: config.region().map(|r| r.as_ref().to_string()),
            client: Client::from_conf(s3_config),
        }
    }

    /// Create client with custom endpoint (for MinIO, R2, etc.)
    pub async fn new_with_endpoint(
        settings: &StoreSettings,
        endpoint: String,
        access_key: String,
        secret_key: String,
    ) -> Self {
        use aws_credential_types::Credentials;

        let creds = Credentials::new(access_key, secret_key, None, None, "s3mirror");

        let region_provider = match settings
            .region
            .clone()
            .or_else(|| infer_region_from_endpoint(&endpoint))
        {
            Some(region) => RegionProviderChain::first_try(Region::new(region)).or_else("us-east-1"),
            None => RegionProviderChain::default_provider().or_else("us-east-1"),
        };

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .endpoint_url(endpoint)
            .credentials_provider(creds)
            .load()
            .await;

        // MinIO wants path style; Aliyun OSS rejects it (SecondLevelDomainForbidden).
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.force_path_style)
            .build();

        Self {
            region: config.region().map(|r| r.as_ref().to_string()),
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ListedObject>, MirrorError> {
        let start = Instant::now();
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| MirrorError::Store(format!("S3 list error: {:?}", e)))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                let size = obj.size().unwrap_or(0).max(0) as u64;
                let modified = obj
                    .last_modified()
                    .map(to_chrono)
                    .unwrap_or_else(Utc::now);
                objects.push(ListedObject {
                    key: key.to_string(),
                    meta: ObjectMeta::new(size, modified),
                });
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        log::info!(
            "S3 list: {} ({} objects, {:.2?})",
            bucket,
            objects.len(),
            start.elapsed()
        );

        Ok(objects)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MirrorError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(MirrorError::Store(format!("S3 head bucket error: {:?}", e)))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), MirrorError> {
        let mut req = self.client.create_bucket().bucket(bucket);

        // us-east-1 is the only region that rejects an explicit constraint.
        if let Some(region) = self.region.as_deref().filter(|r| *r != "us-east-1") {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        req.send()
            .await
            .map_err(|e| MirrorError::Store(format!("S3 create bucket error: {:?}", e)))?;

        log::info!("S3 bucket created: {}", bucket);

        Ok(())
    }

    async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, MirrorError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(resp) => {
                let size = resp.content_length().unwrap_or(0).max(0) as u64;
                let modified = resp
                    .last_modified()
                    .map(to_chrono)
                    .unwrap_or_else(Utc::now);
                Ok(Some(ObjectMeta::new(size, modified)))
            }
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(None)
                } else {
                    Err(MirrorError::Store(format!("S3 head object error: {:?}", e)))
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        policy: AccessPolicy,
    ) -> Result<(), MirrorError> {
        let start = Instant::now();

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| MirrorError::Upload {
                key: key.to_string(),
                reason: format!("cannot read {}: {}", local_path.display(), e),
            })?;

        let acl = match policy {
            AccessPolicy::Private => ObjectCannedAcl::Private,
        };

        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(acl)
            .body(body)
            .send()
            .await;

        let elapsed = start.elapsed();

        match &result {
            Ok(_) => log::info!("S3 upload: {} ({:.2?})", key, elapsed),
            Err(e) => log::error!("S3 upload failed: {} - {:?}", key, e),
        }

        result.map_err(|e| MirrorError::Upload {
            key: key.to_string(),
            reason: format!("{:?}", e),
        })?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), MirrorError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| MirrorError::Delete {
                key: key.to_string(),
                reason: format!("{:?}", e),
            })?;

        log::info!("S3 deleted: {}", key);

        Ok(())
    }
}

fn to_chrono(ts: &SmithyDateTime) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.secs(), 0)
        .single()
        .map(truncate_to_secs)
        .unwrap_or_else(Utc::now)
}

pub fn infer_region_from_endpoint(endpoint: &str) -> Option<String> {
    // - Aliyun OSS: "oss-cn-shanghai.aliyuncs.com" -> "oss-cn-shanghai"
    // - Cloudflare R2: region is typically "auto"
    let host = endpoint
        .split("://")
        .nth(1)
        .unwrap_or(endpoint)
        .split('/')
        .next()
        .unwrap_or("");

    if host.contains("r2.cloudflarestorage.com") {
        return Some("auto".to_string());
    }

    // "s3.oss-cn-shanghai.aliyuncs.com" -> "oss-cn-shanghai"
    host.split('.')
        .find(|label| label.starts_with("oss-"))
        .map(str::to_string)
}

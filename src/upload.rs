//! Result upload to object storage.
//!
//! Every file a step writes is offered to an [`Uploader`] under its output
//! name as the object key. The S3 implementation uses `object_store`'s
//! Amazon client, driven by a private current-thread tokio runtime so the
//! pipeline itself stays synchronous.
//!
//! Successful uploads report a public URL of the form
//! `https://s3-{region}.amazonaws.com/{bucket}/{key}`.

use crate::job::{AwsConfig, JobPayload};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::{ClientOptions, ObjectStore, PutPayload, RetryConfig};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),
    #[error("Uploads are enabled but no aws section was given")]
    MissingConfig,
}

/// Outcome of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    /// Where the object can be fetched; `None` when nothing was uploaded.
    pub public_url: Option<String>,
}

impl UploadResult {
    /// Result for an upload that was deliberately not attempted.
    pub fn skipped() -> Self {
        Self {
            success: true,
            public_url: None,
        }
    }
}

/// Destination for written files.
pub trait Uploader: Sync {
    /// Upload the file at `path` under `key`.
    fn upload(&self, path: &Path, key: &str) -> Result<UploadResult, UploadError>;

    /// Whether [`upload`](Self::upload) actually sends anything.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Uploader for jobs with `disable_network`: every call succeeds without
/// touching the network.
pub struct DisabledUploader;

impl Uploader for DisabledUploader {
    fn upload(&self, _path: &Path, _key: &str) -> Result<UploadResult, UploadError> {
        Ok(UploadResult::skipped())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Public URL of `key` in `bucket`.
pub fn public_url(region: &str, bucket: &str, key: &str) -> String {
    format!("https://s3-{region}.amazonaws.com/{bucket}/{key}")
}

fn client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(60))
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        backoff: object_store::BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(60),
    }
}

/// Uploads to one S3 bucket with static credentials.
pub struct S3Uploader {
    store: AmazonS3,
    region: String,
    bucket: String,
    runtime: tokio::runtime::Runtime,
}

impl S3Uploader {
    pub fn new(aws: &AwsConfig) -> Result<Self, UploadError> {
        tracing::info!(
            region = %aws.region,
            bucket = %aws.s3_bucket_name,
            "creating S3 client"
        );
        let store = AmazonS3Builder::new()
            .with_region(&aws.region)
            .with_bucket_name(&aws.s3_bucket_name)
            .with_access_key_id(&aws.access_key)
            .with_secret_access_key(&aws.secret_key)
            .with_client_options(client_options())
            .with_retry(retry_config())
            .build()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            store,
            region: aws.region.clone(),
            bucket: aws.s3_bucket_name.clone(),
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl Uploader for S3Uploader {
    fn upload(&self, path: &Path, key: &str) -> Result<UploadResult, UploadError> {
        let bytes = std::fs::read(path)?;
        let location = object_store::path::Path::from(key);
        let size = bytes.len();
        self.runtime
            .block_on(self.store.put(&location, PutPayload::from(bytes)))?;
        tracing::debug!(key, size, bucket = %self.bucket, "uploaded");
        Ok(UploadResult {
            success: true,
            public_url: Some(public_url(&self.region, &self.bucket, key)),
        })
    }
}

/// The uploader a job asks for.
pub fn uploader_for(job: &JobPayload) -> Result<Box<dyn Uploader>, UploadError> {
    if job.disable_network {
        return Ok(Box::new(DisabledUploader));
    }
    let aws = job.aws.as_ref().ok_or(UploadError::MissingConfig)?;
    Ok(Box::new(S3Uploader::new(aws)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPayload;
    use serde_json::json;

    fn aws() -> AwsConfig {
        AwsConfig {
            region: "us-east-1".into(),
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "secret".into(),
            s3_bucket_name: "results".into(),
        }
    }

    #[test]
    fn public_url_format() {
        assert_eq!(
            public_url("eu-west-1", "bucket", "merged_file.jpg"),
            "https://s3-eu-west-1.amazonaws.com/bucket/merged_file.jpg"
        );
    }

    #[test]
    fn disabled_uploader_succeeds_without_url() {
        let result = DisabledUploader
            .upload(Path::new("/nonexistent/out.jpg"), "out.jpg")
            .unwrap();
        assert_eq!(result, UploadResult::skipped());
        assert!(result.success);
        assert!(result.public_url.is_none());
        assert!(!DisabledUploader.is_enabled());
    }

    #[test]
    fn s3_uploader_builds_offline() {
        let uploader = S3Uploader::new(&aws()).unwrap();
        assert_eq!(uploader.bucket(), "results");
        assert!(uploader.is_enabled());
    }

    #[test]
    fn s3_upload_of_missing_file_is_io_error() {
        let uploader = S3Uploader::new(&aws()).unwrap();
        let result = uploader.upload(Path::new("/nonexistent/out.jpg"), "out.jpg");
        assert!(matches!(result, Err(UploadError::Io(_))));
    }

    #[test]
    fn uploader_for_respects_disable_network() {
        let job = JobPayload::from_json(
            &json!({"image_url": "in.jpg", "operations": [], "disable_network": true}).to_string(),
        )
        .unwrap();
        assert!(!uploader_for(&job).unwrap().is_enabled());
    }

    #[test]
    fn uploader_for_network_job_without_aws() {
        let job = JobPayload::from_json(&json!({"image_url": "in.jpg"}).to_string()).unwrap();
        assert!(matches!(uploader_for(&job), Err(UploadError::MissingConfig)));
    }
}

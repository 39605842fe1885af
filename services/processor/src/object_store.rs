use crate::config::AwsConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Object storage operations the pipeline depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata-only existence check; returns the content length
    async fn head_object(&self, bucket: &str, key: &str) -> Result<i64, StoreError>;

    /// Copy the object's bytes to `destination`
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, StoreError>;

    /// Upload a local file
    async fn upload(&self, source: &Path, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Mint a time-limited GET URL
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, StoreError>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 client from shared AWS configuration
    pub fn new(sdk_config: &SdkConfig, config: &AwsConfig) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 object store initialized");

        Self { client }
    }
}

/// Map an SDK error onto the store taxonomy using the HTTP status
fn classify<E>(err: SdkError<E, HttpResponse>, what: &str) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{}: {}", what, DisplayErrorContext(&err));
    match status {
        Some(404) => StoreError::NotFound(message),
        Some(403) => StoreError::AccessDenied(message),
        _ => StoreError::Transport(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<i64, StoreError> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, "HeadObject failed"))?;

        Ok(response.content_length().unwrap_or_default())
    }

    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, StoreError> {
        let mut response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, "GetObject failed"))?;

        let io_err = |e: std::io::Error| StoreError::Transport(format!("local write failed: {}", e));

        let mut file = tokio::fs::File::create(destination).await.map_err(io_err)?;
        let mut written = 0u64;

        while let Some(bytes) = response
            .body
            .try_next()
            .await
            .map_err(|e| StoreError::Transport(format!("body stream failed: {}", e)))?
        {
            file.write_all(&bytes).await.map_err(io_err)?;
            written += bytes.len() as u64;
        }

        file.flush().await.map_err(io_err)?;

        debug!(bytes = written, "Object downloaded");
        Ok(written)
    }

    #[instrument(skip(self, source), fields(source = %source.display()))]
    async fn upload(&self, source: &Path, bucket: &str, key: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StoreError::Transport(format!("failed to open {}: {}", source.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type("application/zip")
            .send()
            .await
            .map_err(|e| classify(e, "PutObject failed"))?;

        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::Transport(format!("invalid presigning config: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| classify(e, "Presigning failed"))?;

        Ok(presigned.uri().to_string())
    }
}

use crate::error::PipelineError;
use crate::object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Default lifetime of retrieval links
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(3600);

/// Uploads archives and mints retrieval links
pub struct ResultPublisher {
    store: Arc<dyn ObjectStore>,
    link_ttl: Duration,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, link_ttl: Duration) -> Self {
        Self { store, link_ttl }
    }

    /// Upload the local archive to `bucket/key`
    #[instrument(skip(self, archive_path), fields(archive = %archive_path.display()))]
    pub async fn upload(&self, archive_path: &Path, bucket: &str, key: &str) -> Result<(), PipelineError> {
        info!("Uploading archive");

        self.store
            .upload(archive_path, bucket, key)
            .await
            .map_err(|e| {
                error!(error = %e, "Archive upload failed");
                PipelineError::PublishFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })?;

        info!("Archive uploaded");
        Ok(())
    }

    /// Mint a GET link valid for the configured TTL
    pub async fn presign(&self, bucket: &str, key: &str) -> Result<String, PipelineError> {
        self.presign_for(bucket, key, self.link_ttl).await
    }

    /// Mint a GET link valid for `ttl`
    #[instrument(skip(self))]
    pub async fn presign_for(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, PipelineError> {
        self.store
            .presign_get(bucket, key, ttl)
            .await
            .map_err(|e| {
                warn!(error = %e, "Could not generate retrieval link");
                PipelineError::PublishFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })
    }
}

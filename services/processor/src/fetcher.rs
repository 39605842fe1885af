use crate::error::PipelineError;
use crate::object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Validates source objects and copies them into the local working area
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Metadata-only existence check. Any failure here is fatal for the job.
    #[instrument(skip(self))]
    pub async fn validate(&self, bucket: &str, key: &str) -> Result<i64, PipelineError> {
        match self.store.head_object(bucket, key).await {
            Ok(size) => {
                info!(size_bytes = size, "Source object validated");
                Ok(size)
            }
            Err(source) => {
                error!(error = %source, "HeadObject failed");
                Err(PipelineError::SourceUnavailable {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Copy the object to `destination`, creating its parent directory
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    pub async fn fetch(&self, bucket: &str, key: &str, destination: &Path) -> Result<(), PipelineError> {
        let fetch_failed = |message: String| PipelineError::FetchFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fetch_failed(e.to_string()))?;
        }

        info!("Downloading source object");

        match self.store.download(bucket, key, destination).await {
            Ok(bytes) => {
                info!(size_bytes = bytes, "Download complete");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Download failed");
                Err(fetch_failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::key_parser::JobKey;
    use crate::object_store::MockObjectStore;
    use crate::workspace::JobWorkspace;

    #[tokio::test]
    async fn test_validate_maps_not_found() {
        let mut store = MockObjectStore::new();
        store
            .expect_head_object()
            .returning(|_, key| Err(StoreError::NotFound(key.to_string())));

        let fetcher = ObjectFetcher::new(Arc::new(store));
        match fetcher.validate("uploads", "a.1.mp4").await {
            Err(PipelineError::SourceUnavailable { source, .. }) => {
                assert!(matches!(source, StoreError::NotFound(_)))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_maps_access_denied() {
        let mut store = MockObjectStore::new();
        store
            .expect_head_object()
            .returning(|_, _| Err(StoreError::AccessDenied("403".to_string())));

        let fetcher = ObjectFetcher::new(Arc::new(store));
        match fetcher.validate("uploads", "a.1.mp4").await {
            Err(PipelineError::SourceUnavailable { source, .. }) => {
                assert!(matches!(source, StoreError::AccessDenied(_)))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_writes_deterministic_path() {
        let scratch = tempfile::tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store
            .expect_download()
            .withf(|bucket, key, _| bucket == "uploads" && key == "clip.77.mov")
            .returning(|_, _, destination| {
                std::fs::write(destination, b"video").unwrap();
                Ok(5)
            });

        let fetcher = ObjectFetcher::new(Arc::new(store));
        let job_key = JobKey::parse("clip.77.mov").unwrap();
        let workspace = JobWorkspace::new(&scratch.path().join("nested"), &job_key);
        fetcher
            .fetch("uploads", "clip.77.mov", workspace.video_path())
            .await
            .unwrap();

        assert_eq!(workspace.video_path(), scratch.path().join("nested").join("clip_77.mov"));
        assert_eq!(std::fs::read(workspace.video_path()).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_fetch_transfer_error_is_soft_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store
            .expect_download()
            .returning(|_, _, _| Err(StoreError::Transport("connection reset".to_string())));

        let fetcher = ObjectFetcher::new(Arc::new(store));
        let result = fetcher
            .fetch("uploads", "clip.77.mov", &scratch.path().join("clip_77.mov"))
            .await;

        match result {
            Err(PipelineError::FetchFailed { message, .. }) => {
                assert!(message.contains("connection reset"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

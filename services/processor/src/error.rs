use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the external collaborators (object store, table, queue)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors that can occur while processing an ingest job
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid queue message: {0}")]
    InvalidEnvelope(String),

    #[error("Malformed object key '{key}': expected <group-id>.<sequence-token>.<extension>")]
    MalformedKey { key: String },

    #[error("Source object s3://{bucket}/{key} unavailable: {source}")]
    SourceUnavailable {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to fetch s3://{bucket}/{key}: {message}")]
    FetchFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Frame extraction failed for {input}: {message}")]
    ExtractionFailed { input: PathBuf, message: String },

    #[error("Failed to archive {frames_dir}: {message}")]
    ArchiveFailed { frames_dir: PathBuf, message: String },

    #[error("Failed to publish s3://{bucket}/{key}: {message}")]
    PublishFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to persist metadata for {group_id}: {message}")]
    PersistFailed { group_id: String, message: String },

    #[error("Failed to send notification: {0}")]
    NotifyFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short machine-friendly name of the failure category
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidEnvelope(_) => "invalid_envelope",
            PipelineError::MalformedKey { .. } => "malformed_key",
            PipelineError::SourceUnavailable { .. } => "source_unavailable",
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::ArchiveFailed { .. } => "archive_failed",
            PipelineError::PublishFailed { .. } => "publish_failed",
            PipelineError::PersistFailed { .. } => "persist_failed",
            PipelineError::NotifyFailed(_) => "notify_failed",
            PipelineError::Io(_) => "io",
        }
    }
}

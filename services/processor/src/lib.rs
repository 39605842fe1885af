//! Frame Processor
//!
//! Video ingestion service. Each uploaded video object named
//! `<group-id>.<sequence-token>.<extension>` is sampled at one frame per
//! second, the frames are packaged into a zip archive, the archive is
//! published under `<group-id>/<sequence-token>.zip` with a time-limited
//! retrieval link, a provenance row is written, and the uploader is notified
//! through a templated-email queue.
//!
//! ## Architecture
//!
//! ```text
//! Ingest Queue (SQS)
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ Storage      │─────▶│ Ingest       │─────▶│ Orchestrator │
//! │ Notifications│      │ Consumer     │      └──────────────┘
//! └──────────────┘      └──────────────┘             │
//!        ┌───────────────────┬───────────────────┬───┴───────────────┐
//!        ▼                   ▼                   ▼                   ▼
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Key Parser   │    │ Fetcher      │───▶│ Extractor    │───▶│ Archiver     │
//! └──────────────┘    │ (S3 GET)     │    │ (ffmpeg)     │    │ (zip)        │
//!                     └──────────────┘    └──────────────┘    └──────────────┘
//!                                                                    │
//!        ┌───────────────────────────────────────────────────────────┘
//!        ▼
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Publisher    │───▶│ Recorder     │───▶│ Notifier     │
//! │ (S3 PUT/URL) │    │ (DynamoDB)   │    │ (SQS)        │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

pub mod archiver;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod job;
pub mod key_parser;
pub mod notifier;
pub mod object_store;
pub mod orchestrator;
pub mod publisher;
pub mod recorder;
pub mod workspace;

pub use config::Config;
pub use consumer::{IngestConsumer, IngestQueue, SqsIngestQueue};
pub use envelope::{QueueBatch, QueueRecord, SourceObject};
pub use error::{PipelineError, StoreError};
pub use extractor::{FfmpegSampler, FrameSampler};
pub use job::{BatchReport, JobReport, JobState};
pub use key_parser::JobKey;
pub use notifier::{MessageQueue, NotificationMessage, SqsMessageQueue};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
pub use recorder::{DynamoDbTable, MetadataTable};

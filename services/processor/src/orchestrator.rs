//! Job orchestration.
//!
//! Drives one job per queue record through the pipeline stages:
//!
//! ```text
//! RECEIVED -> VALIDATED -> FETCHED -> EXTRACTED -> ARCHIVED -> PUBLISHED -> RECORDED -> NOTIFIED
//!     |
//!     +-> REJECTED (malformed key, failure notification sent)
//!
//! any fatal stage failure after key parsing -> ABORTED (no notification)
//! ```
//!
//! Records in a batch are processed sequentially and in isolation: a failing
//! job never prevents its siblings from completing.

use crate::archiver::Archiver;
use crate::config::{Config, NotificationConfig};
use crate::envelope::{QueueBatch, QueueRecord, SourceObject};
use crate::error::PipelineError;
use crate::extractor::{FrameExtractor, FrameSampler};
use crate::fetcher::ObjectFetcher;
use crate::job::{BatchReport, IngestJob, JobReport, JobState};
use crate::key_parser::JobKey;
use crate::notifier::{MessageQueue, NotificationMessage, Notifier, SuccessDetails};
use crate::object_store::ObjectStore;
use crate::publisher::ResultPublisher;
use crate::recorder::{format_timestamp, JobStatus, MetadataRecorder, MetadataTable};
use crate::workspace::JobWorkspace;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// External collaborators injected into the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub object_store: Arc<dyn ObjectStore>,
    pub frame_sampler: Arc<dyn FrameSampler>,
    pub metadata_table: Arc<dyn MetadataTable>,
    pub message_queue: Arc<dyn MessageQueue>,
}

/// Pipeline settings independent of the collaborators
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub scratch_dir: PathBuf,
    pub output_bucket: String,
    pub link_ttl: Duration,
    /// Store the retrieval URL instead of the output URI in metadata rows
    pub record_retrieval_url: bool,
    pub notification: NotificationConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scratch_dir: config.workspace.scratch_dir.clone(),
            output_bucket: config.s3.output_bucket.clone(),
            link_ttl: config.presigned_url_expiry(),
            record_retrieval_url: config.metadata.record_retrieval_url,
            notification: config.notification.clone(),
        }
    }
}

/// Entry point of the ingestion pipeline
pub struct Orchestrator {
    fetcher: ObjectFetcher,
    extractor: FrameExtractor,
    archiver: Archiver,
    publisher: ResultPublisher,
    recorder: MetadataRecorder,
    notifier: Notifier,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            fetcher: ObjectFetcher::new(collaborators.object_store.clone()),
            extractor: FrameExtractor::new(collaborators.frame_sampler),
            archiver: Archiver,
            publisher: ResultPublisher::new(collaborators.object_store, settings.link_ttl),
            recorder: MetadataRecorder::new(collaborators.metadata_table),
            notifier: Notifier::new(collaborators.message_queue),
            settings,
        }
    }

    /// Process every record of the batch, one job at a time
    pub async fn handle_batch(&self, batch: &QueueBatch) -> BatchReport {
        info!(records = batch.records.len(), "Processing batch");

        let mut report = BatchReport::default();
        for record in &batch.records {
            report.jobs.push(self.handle_record(record).await);
        }

        info!(
            notified = report.count(JobState::Notified),
            rejected = report.count(JobState::Rejected),
            aborted = report.count(JobState::Aborted),
            "Batch processed"
        );

        report
    }

    /// Process a single queue record; never fails, the outcome is in the report
    pub async fn handle_record(&self, record: &QueueRecord) -> JobReport {
        let source = match record.source_object() {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, message_id = ?record.message_id, "Dropping undecodable message");
                metrics::counter!("processor.jobs.aborted").increment(1);
                let mut report = JobReport::undecodable(e.to_string());
                report.message_id = record.message_id.clone();
                return report;
            }
        };

        let mut job = IngestJob::received(&source);
        let span = info_span!(
            "ingest_job",
            job_id = %job.job_id,
            bucket = %source.bucket,
            key = %source.key
        );

        let mut report = self.run_job(&mut job).instrument(span).await;
        report.message_id = record.message_id.clone();
        report
    }

    async fn run_job(&self, job: &mut IngestJob) -> JobReport {
        info!("Starting ingest job");

        let job_key = match JobKey::parse(&job.source.key) {
            Ok(job_key) => job_key,
            Err(err) => return self.reject(job, err).await,
        };

        job.group_id = Some(job_key.group_id.clone());
        job.sequence_token = Some(job_key.sequence_token.clone());
        let destination_key = job_key.destination_key();

        info!(
            group_id = %job_key.group_id,
            sequence_token = %job_key.sequence_token,
            destination_key = %destination_key,
            "Parsed object key"
        );

        let workspace = JobWorkspace::new(&self.settings.scratch_dir, &job_key);
        let result = self.run_stages(job, &job_key, &workspace, &destination_key).await;
        drop(workspace);

        match result {
            Ok(notification_id) => {
                let mut report = JobReport::from_job(job, Some(destination_key));
                report.notification_id = notification_id;
                report
            }
            Err(err) => {
                error!(error = %err, kind = err.kind(), state = %job.state, "Ingest job aborted");
                job.advance(JobState::Aborted);
                metrics::counter!("processor.jobs.aborted").increment(1);

                let output_uri = self.output_uri(&destination_key);
                if let Err(e) = self
                    .recorder
                    .save(&job_key.group_id, &job.source.uri(), &output_uri, JobStatus::Failed)
                    .await
                {
                    warn!(error = %e, "Could not record failed job");
                }

                let mut report = JobReport::from_job(job, Some(destination_key));
                report.error = Some(err.to_string());
                report
            }
        }
    }

    /// Runs the stages after key parsing. Returns the notification id, if one was sent.
    async fn run_stages(
        &self,
        job: &mut IngestJob,
        job_key: &JobKey,
        workspace: &JobWorkspace,
        destination_key: &str,
    ) -> Result<Option<String>, PipelineError> {
        let SourceObject { bucket, key } = job.source.clone();

        self.fetcher.validate(&bucket, &key).await?;
        job.advance(JobState::Validated);

        self.fetcher.fetch(&bucket, &key, workspace.video_path()).await?;
        job.advance(JobState::Fetched);

        let frames = self
            .extractor
            .extract(workspace.video_path(), workspace.frames_dir())
            .await?;
        job.frame_count = frames.frame_count;
        job.advance(JobState::Extracted);

        let archive = self
            .archiver
            .archive(&frames.frames_dir, workspace.archive_path())
            .await?;
        job.archive_size = archive.size_bytes;
        job.advance(JobState::Archived);

        let output_bucket = self.settings.output_bucket.as_str();
        let output_uri = self.output_uri(destination_key);

        let pre_upload_link = self.publisher.presign(output_bucket, destination_key).await.ok();
        self.publisher
            .upload(&archive.path, output_bucket, destination_key)
            .await?;
        job.advance(JobState::Published);

        let recorded_output = match (&pre_upload_link, self.settings.record_retrieval_url) {
            (Some(link), true) => link.clone(),
            _ => output_uri.clone(),
        };
        // Persistence failures do not gate the notification
        if let Err(e) = self
            .recorder
            .save(&job_key.group_id, &job.source.uri(), &recorded_output, JobStatus::Completed)
            .await
        {
            warn!(error = %e, "Continuing without metadata record");
        }
        job.advance(JobState::Recorded);

        let download_link = match self.publisher.presign(output_bucket, destination_key).await {
            Ok(link) => link,
            Err(_) => pre_upload_link.unwrap_or(output_uri),
        };
        info!(download_link = %download_link, "Retrieval link ready");
        job.retrieval_url = Some(download_link.clone());

        let message = NotificationMessage::success(
            &self.settings.notification,
            &SuccessDetails {
                download_link,
                archive_size_bytes: archive.size_bytes,
                frame_count: frames.frame_count,
                processed_at: format_timestamp(Utc::now()),
            },
        );

        match self.notifier.notify(&message).await {
            Ok(message_id) => {
                job.advance(JobState::Notified);
                metrics::counter!("processor.jobs.completed").increment(1);
                info!(frame_count = job.frame_count, archive_size = job.archive_size, "Ingest job completed");
                Ok(Some(message_id))
            }
            Err(e) => {
                warn!(error = %e, "Job completed but the uploader was not notified");
                Ok(None)
            }
        }
    }

    /// Terminal failure for keys that do not follow the naming pattern
    async fn reject(&self, job: &mut IngestJob, err: PipelineError) -> JobReport {
        warn!(error = %err, "Rejecting upload");

        let file_name = job.source.key.clone();
        let message = NotificationMessage::failure(
            &self.settings.notification,
            &file_name,
            &NotificationMessage::invalid_file_name_description(&file_name),
            format_timestamp(Utc::now()),
        );
        let notification_id = self.notifier.notify(&message).await.ok();

        job.advance(JobState::Rejected);
        metrics::counter!("processor.jobs.rejected").increment(1);

        let mut report = JobReport::from_job(job, None);
        report.notification_id = notification_id;
        report.error = Some(err.to_string());
        report
    }

    fn output_uri(&self, destination_key: &str) -> String {
        format!("s3://{}/{}", self.settings.output_bucket, destination_key)
    }
}

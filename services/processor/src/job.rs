use crate::envelope::SourceObject;
use serde::Serialize;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of one ingest job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Received,
    Validated,
    Fetched,
    Extracted,
    Archived,
    Published,
    Recorded,
    /// Terminal success
    Notified,
    /// Terminal failure after a key-parse rejection; the uploader was told
    Rejected,
    /// Terminal failure of any other stage; no notification
    Aborted,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "RECEIVED",
            JobState::Validated => "VALIDATED",
            JobState::Fetched => "FETCHED",
            JobState::Extracted => "EXTRACTED",
            JobState::Archived => "ARCHIVED",
            JobState::Published => "PUBLISHED",
            JobState::Recorded => "RECORDED",
            JobState::Notified => "NOTIFIED",
            JobState::Rejected => "REJECTED",
            JobState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// Working state of one orchestration pass; discarded when the job ends
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub job_id: Uuid,
    pub source: SourceObject,
    pub group_id: Option<String>,
    pub sequence_token: Option<String>,
    pub archive_size: u64,
    pub frame_count: usize,
    pub retrieval_url: Option<String>,
    pub state: JobState,
}

impl IngestJob {
    pub fn received(source: &SourceObject) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            source: source.clone(),
            group_id: None,
            sequence_token: None,
            archive_size: 0,
            frame_count: 0,
            retrieval_url: None,
            state: JobState::Received,
        }
    }

    /// Move to the next state
    pub fn advance(&mut self, next: JobState) {
        debug!(job_id = %self.job_id, from = %self.state, to = %next, "Job state transition");
        self.state = next;
    }
}

/// Summary of one job after it reached a terminal (or stuck) state
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Option<Uuid>,
    pub message_id: Option<String>,
    pub source_key: Option<String>,
    pub group_id: Option<String>,
    pub sequence_token: Option<String>,
    pub destination_key: Option<String>,
    pub state: JobState,
    pub frame_count: usize,
    pub archive_size: u64,
    pub retrieval_url: Option<String>,
    pub notification_id: Option<String>,
    pub error: Option<String>,
}

impl JobReport {
    pub fn from_job(job: &IngestJob, destination_key: Option<String>) -> Self {
        Self {
            job_id: Some(job.job_id),
            message_id: None,
            source_key: Some(job.source.key.clone()),
            group_id: job.group_id.clone(),
            sequence_token: job.sequence_token.clone(),
            destination_key,
            state: job.state,
            frame_count: job.frame_count,
            archive_size: job.archive_size,
            retrieval_url: job.retrieval_url.clone(),
            notification_id: None,
            error: None,
        }
    }

    /// Report for a message that never became a job
    pub fn undecodable(error: String) -> Self {
        Self {
            job_id: None,
            message_id: None,
            source_key: None,
            group_id: None,
            sequence_token: None,
            destination_key: None,
            state: JobState::Aborted,
            frame_count: 0,
            archive_size: 0,
            retrieval_url: None,
            notification_id: None,
            error: Some(error),
        }
    }

    /// Whether the queue message can be deleted
    ///
    /// Aborted jobs stay on the queue for redelivery; undecodable messages do not.
    pub fn should_acknowledge(&self) -> bool {
        match self.state {
            JobState::Aborted => self.job_id.is_none(),
            _ => true,
        }
    }
}

/// Result of processing one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }
}

use crate::config::MetadataConfig;
use crate::error::{PipelineError, StoreError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Timestamp format used in metadata rows: `DD/MM/YYYY HH:MM:SS`
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Format a timestamp for metadata rows and notifications
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Terminal status of a job attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the metadata table, keyed by `user_uuid` (the group-id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub user_uuid: String,
    pub timestamp: String,
    pub input_key: String,
    pub output_key: String,
    pub status: JobStatus,
}

impl MetadataRecord {
    pub fn new(
        group_id: &str,
        input_location: &str,
        output_location: &str,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_uuid: group_id.to_string(),
            timestamp: format_timestamp(at),
            input_key: input_location.to_string(),
            output_key: output_location.to_string(),
            status,
        }
    }

    /// DynamoDB item representation
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("user_uuid".to_string(), AttributeValue::S(self.user_uuid.clone())),
            ("timestamp".to_string(), AttributeValue::S(self.timestamp.clone())),
            ("input_key".to_string(), AttributeValue::S(self.input_key.clone())),
            ("output_key".to_string(), AttributeValue::S(self.output_key.clone())),
            ("status".to_string(), AttributeValue::S(self.status.as_str().to_string())),
        ])
    }
}

/// Persistent table receiving one insert per job attempt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataTable: Send + Sync {
    async fn put_record(&self, record: &MetadataRecord) -> Result<(), StoreError>;
}

/// DynamoDB-backed metadata table
pub struct DynamoDbTable {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbTable {
    pub fn new(sdk_config: &SdkConfig, config: &MetadataConfig) -> Self {
        info!(table = %config.table_name, "DynamoDB metadata table initialized");

        Self {
            client: DynamoDbClient::new(sdk_config),
            table_name: config.table_name.clone(),
        }
    }
}

#[async_trait]
impl MetadataTable for DynamoDbTable {
    async fn put_record(&self, record: &MetadataRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record.to_item()))
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("PutItem failed: {}", DisplayErrorContext(&e))))?;

        Ok(())
    }
}

/// Writes provenance rows; failures are reported, never fatal
pub struct MetadataRecorder {
    table: Arc<dyn MetadataTable>,
}

impl MetadataRecorder {
    pub fn new(table: Arc<dyn MetadataTable>) -> Self {
        Self { table }
    }

    /// Insert a single record for this job attempt
    #[instrument(skip(self))]
    pub async fn save(
        &self,
        group_id: &str,
        input_location: &str,
        output_location: &str,
        status: JobStatus,
    ) -> Result<MetadataRecord, PipelineError> {
        let record = MetadataRecord::new(group_id, input_location, output_location, status, Utc::now());

        info!(record = ?record, "Writing metadata record");

        match self.table.put_record(&record).await {
            Ok(()) => {
                info!("Metadata record written");
                Ok(record)
            }
            Err(e) => {
                error!(error = %e, "Failed to write metadata record");
                metrics::counter!("processor.metadata.failed").increment(1);
                Err(PipelineError::PersistFailed {
                    group_id: group_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

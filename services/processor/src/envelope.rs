//! Inbound wire types.
//!
//! A batch of queue records, each carrying a storage-change notification
//! serialized as JSON in its `body`.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Batch of queued messages delivered to the processor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

/// One queued message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "receiptHandle", default)]
    pub receipt_handle: Option<String>,
    pub body: String,
}

/// Storage-change notification: `{Records:[{s3:{bucket:{name}, object:{key}}}]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

/// Bucket and key of the object that triggered a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

impl SourceObject {
    /// `s3://bucket/key`
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl QueueRecord {
    /// Create a record wrapping the given body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Decode the body and return the first storage record's object
    pub fn source_object(&self) -> Result<SourceObject, PipelineError> {
        let notification: StorageNotification = serde_json::from_str(&self.body)
            .map_err(|e| PipelineError::InvalidEnvelope(e.to_string()))?;

        let record = notification.records.into_iter().next().ok_or_else(|| {
            PipelineError::InvalidEnvelope("storage notification has no records".to_string())
        })?;

        Ok(SourceObject {
            bucket: record.s3.bucket.name,
            key: decode_object_key(&record.s3.object.key)?,
        })
    }
}

/// Object keys arrive form-encoded: `+` for a space, `%XX` for other bytes
fn decode_object_key(raw: &str) -> Result<String, PipelineError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::InvalidEnvelope(format!("object key '{}' is not valid UTF-8: {}", raw, e)))
}

impl StorageNotification {
    /// Build a single-record notification
    pub fn for_object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![StorageRecord {
                s3: StorageEntity {
                    bucket: BucketRef { name: bucket.into() },
                    object: ObjectRef { key: key.into() },
                },
            }],
        }
    }
}

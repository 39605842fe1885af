use crate::config::NotificationConfig;
use crate::error::{PipelineError, StoreError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client as SqsClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Placeholder keys understood by the email templates
pub mod placeholders {
    pub const FIRST_NAME: &str = "FIRST_NAME";
    pub const FILE_NAME: &str = "FILE_NAME";
    pub const PROCESS_DATE: &str = "PROCESS_DATE";
    pub const FILE_SIZE: &str = "FILE_SIZE";
    pub const RECORDS_COUNT: &str = "RECORDS_COUNT";
    pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
}

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable size: `0B`, `1023.0 B`, `1.0 KB`, `1.5 MB`
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }

    let mut unit = 0;
    let mut divisor = 1u64;
    while unit + 1 < SIZE_UNITS.len() && size_bytes / divisor >= 1024 {
        divisor *= 1024;
        unit += 1;
    }

    let scaled = ((size_bytes as f64 / divisor as f64) * 100.0).round_ties_even() / 100.0;
    // Debug formatting keeps a trailing `.0` on whole numbers
    format!("{:?} {}", scaled, SIZE_UNITS[unit])
}

/// Queue payload consumed by the templated-email dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub receiver_email: String,
    pub sender_email: String,
    pub template_name: String,
    pub placeholders: BTreeMap<String, Value>,
}

/// Values rendered into the success template
#[derive(Debug, Clone)]
pub struct SuccessDetails {
    pub download_link: String,
    pub archive_size_bytes: u64,
    pub frame_count: usize,
    pub processed_at: String,
}

impl NotificationMessage {
    /// Build the success message
    pub fn success(config: &NotificationConfig, details: &SuccessDetails) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            placeholders::FIRST_NAME.to_string(),
            Value::from(config.recipient_name.clone()),
        );
        values.insert(
            placeholders::FILE_NAME.to_string(),
            Value::from(details.download_link.clone()),
        );
        values.insert(
            placeholders::PROCESS_DATE.to_string(),
            Value::from(details.processed_at.clone()),
        );
        values.insert(
            placeholders::FILE_SIZE.to_string(),
            Value::from(format_size(details.archive_size_bytes)),
        );
        values.insert(
            placeholders::RECORDS_COUNT.to_string(),
            Value::from(details.frame_count),
        );

        Self {
            receiver_email: config.receiver_email.clone(),
            sender_email: config.sender_email.clone(),
            template_name: config.success_template.clone(),
            placeholders: values,
        }
    }

    /// Build the failure message for an upload whose name could not be parsed
    pub fn failure(
        config: &NotificationConfig,
        file_name: &str,
        error_description: &str,
        processed_at: String,
    ) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            placeholders::FIRST_NAME.to_string(),
            Value::from(config.recipient_name.clone()),
        );
        values.insert(placeholders::FILE_NAME.to_string(), Value::from(file_name));
        values.insert(
            placeholders::ERROR_MESSAGE.to_string(),
            Value::from(error_description),
        );
        values.insert(placeholders::PROCESS_DATE.to_string(), Value::from(processed_at));

        Self {
            receiver_email: config.receiver_email.clone(),
            sender_email: config.sender_email.clone(),
            template_name: config.failure_template.clone(),
            placeholders: values,
        }
    }

    /// Human readable reason for a rejected file name
    pub fn invalid_file_name_description(file_name: &str) -> String {
        format!(
            "Invalid file name '{}': it does not match the expected naming pattern \
             <name>.<timestamp>.<extension>",
            file_name
        )
    }
}

/// Asynchronous delivery queue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a message body and return the transport-assigned id
    async fn send(&self, body: String) -> Result<String, StoreError>;
}

/// SQS-backed delivery queue
pub struct SqsMessageQueue {
    client: SqsClient,
    queue_url: String,
}

impl SqsMessageQueue {
    pub fn new(sdk_config: &SdkConfig, queue_url: impl Into<String>) -> Self {
        let queue_url = queue_url.into();
        info!(queue_url = %queue_url, "SQS notification queue initialized");

        Self {
            client: SqsClient::new(sdk_config),
            queue_url,
        }
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn send(&self, body: String) -> Result<String, StoreError> {
        let response = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("SendMessage failed: {}", DisplayErrorContext(&e))))?;

        Ok(response.message_id().unwrap_or_default().to_string())
    }
}

/// Serializes notification messages onto the delivery queue
pub struct Notifier {
    queue: Arc<dyn MessageQueue>,
}

impl Notifier {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    /// Send the message; failures are logged and returned, never retried
    #[instrument(skip(self, message), fields(template = %message.template_name))]
    pub async fn notify(&self, message: &NotificationMessage) -> Result<String, PipelineError> {
        let body = serde_json::to_string(message)
            .map_err(|e| PipelineError::NotifyFailed(format!("serialization failed: {}", e)))?;

        match self.queue.send(body).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "Notification queued");
                Ok(message_id)
            }
            Err(e) => {
                error!(error = %e, "Failed to queue notification");
                metrics::counter!("processor.notifications.failed").increment(1);
                Err(PipelineError::NotifyFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification_config() -> NotificationConfig {
        NotificationConfig {
            queue_url: "https://queue.test/url".to_string(),
            receiver_email: "user@example.com".to_string(),
            sender_email: "noreply@example.com".to_string(),
            recipient_name: "Ana".to_string(),
            success_template: "SUCCESS_EMAIL_TEMPLATE".to_string(),
            failure_template: "FAILURE_EMAIL_TEMPLATE".to_string(),
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1), "1.0 B");
        assert_eq!(format_size(1023), "1023.0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1152), "1.12 KB");
        assert_eq!(format_size(1184), "1.16 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024 * 1024), "2048.0 TB");
    }

    #[test]
    fn test_success_message_placeholders() {
        let message = NotificationMessage::success(
            &notification_config(),
            &SuccessDetails {
                download_link: "https://download.link".to_string(),
                archive_size_bytes: 2048,
                frame_count: 4,
                processed_at: "01/01/2021 12:00:00".to_string(),
            },
        );

        assert_eq!(message.template_name, "SUCCESS_EMAIL_TEMPLATE");
        assert_eq!(message.placeholders[placeholders::FILE_NAME], "https://download.link");
        assert_eq!(message.placeholders[placeholders::FILE_SIZE], "2.0 KB");
        assert_eq!(message.placeholders[placeholders::RECORDS_COUNT], 4);
        assert_eq!(message.placeholders[placeholders::PROCESS_DATE], "01/01/2021 12:00:00");
    }

    #[test]
    fn test_payload_wire_shape() {
        let message = NotificationMessage::failure(
            &notification_config(),
            "badfilenamemp4",
            &NotificationMessage::invalid_file_name_description("badfilenamemp4"),
            "01/01/2021 12:00:00".to_string(),
        );

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["receiver_email"], "user@example.com");
        assert_eq!(json["sender_email"], "noreply@example.com");
        assert_eq!(json["template_name"], "FAILURE_EMAIL_TEMPLATE");
        assert_eq!(json["placeholders"]["FILE_NAME"], "badfilenamemp4");
        assert!(json["placeholders"]["ERROR_MESSAGE"]
            .as_str()
            .unwrap()
            .contains("naming pattern"));
    }

    #[tokio::test]
    async fn test_notify_returns_message_id() {
        let mut queue = MockMessageQueue::new();
        queue
            .expect_send()
            .withf(|body| serde_json::from_str::<NotificationMessage>(body).is_ok())
            .times(1)
            .returning(|_| Ok("abc123".to_string()));

        let notifier = Notifier::new(Arc::new(queue));
        let message = NotificationMessage::failure(&notification_config(), "x", "y", String::new());
        assert_eq!(notifier.notify(&message).await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_notify_failure_is_reported() {
        let mut queue = MockMessageQueue::new();
        queue
            .expect_send()
            .returning(|_| Err(StoreError::Transport("InternalError".to_string())));

        let notifier = Notifier::new(Arc::new(queue));
        let message = NotificationMessage::failure(&notification_config(), "x", "y", String::new());
        assert!(matches!(
            notifier.notify(&message).await,
            Err(PipelineError::NotifyFailed(_))
        ));
    }
}

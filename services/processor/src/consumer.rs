use crate::config::IngestQueueConfig;
use crate::envelope::{QueueBatch, QueueRecord};
use crate::error::StoreError;
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client as SqsClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Back-off applied after a failed receive call
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Source of storage-change notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestQueue: Send + Sync {
    /// Long-poll for the next batch of messages; may return an empty batch
    async fn receive(&self) -> Result<Vec<QueueRecord>, StoreError>;

    /// Delete a handled message
    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), StoreError>;
}

/// SQS-backed ingest queue
pub struct SqsIngestQueue {
    client: SqsClient,
    config: IngestQueueConfig,
}

impl SqsIngestQueue {
    pub fn new(sdk_config: &SdkConfig, config: &IngestQueueConfig) -> Self {
        info!(
            queue_url = %config.queue_url,
            max_messages = config.max_messages,
            wait_time_secs = config.wait_time_secs,
            "SQS ingest queue initialized"
        );

        Self {
            client: SqsClient::new(sdk_config),
            config: config.clone(),
        }
    }
}

#[async_trait]
impl IngestQueue for SqsIngestQueue {
    async fn receive(&self) -> Result<Vec<QueueRecord>, StoreError> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.config.queue_url)
            .max_number_of_messages(self.config.max_messages)
            .wait_time_seconds(self.config.wait_time_secs)
            .set_visibility_timeout(self.config.visibility_timeout_secs)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("ReceiveMessage failed: {}", DisplayErrorContext(&e))))?;

        let records = response
            .messages()
            .iter()
            .map(|message| QueueRecord {
                message_id: message.message_id().map(str::to_string),
                receipt_handle: message.receipt_handle().map(str::to_string),
                body: message.body().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(records)
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), StoreError> {
        self.client
            .delete_message()
            .queue_url(&self.config.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("DeleteMessage failed: {}", DisplayErrorContext(&e))))?;

        Ok(())
    }
}

/// Polls the ingest queue and feeds batches to the orchestrator
pub struct IngestConsumer {
    queue: Arc<dyn IngestQueue>,
    orchestrator: Arc<Orchestrator>,
}

impl IngestConsumer {
    pub fn new(queue: Arc<dyn IngestQueue>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { queue, orchestrator }
    }

    /// Consume until `shutdown` resolves. A batch in flight is always finished.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Starting ingest consumer");
        tokio::pin!(shutdown);

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.queue.receive() => received,
            };

            match received {
                Ok(records) if records.is_empty() => {
                    debug!("No messages received");
                }
                Ok(records) => {
                    self.process(records).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive messages");
                    metrics::counter!("processor.queue.errors").increment(1);
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Ingest consumer stopped");
    }

    /// Receive and process a single batch. Returns the number of acknowledged messages.
    pub async fn poll_once(&self) -> Result<usize, StoreError> {
        let records = self.queue.receive().await?;
        if records.is_empty() {
            return Ok(0);
        }
        Ok(self.process(records).await)
    }

    #[instrument(skip(self, records), fields(messages = records.len()))]
    async fn process(&self, records: Vec<QueueRecord>) -> usize {
        let batch = QueueBatch { records };
        let report = self.orchestrator.handle_batch(&batch).await;

        let mut acknowledged = 0;
        for (record, job) in batch.records.iter().zip(&report.jobs) {
            if !job.should_acknowledge() {
                warn!(
                    message_id = ?record.message_id,
                    state = %job.state,
                    "Leaving message for redelivery"
                );
                continue;
            }

            let Some(receipt_handle) = record.receipt_handle.as_deref() else {
                continue;
            };

            match self.queue.acknowledge(receipt_handle).await {
                Ok(()) => acknowledged += 1,
                Err(e) => warn!(message_id = ?record.message_id, error = %e, "Failed to delete message"),
            }
        }

        metrics::counter!("processor.messages.acknowledged").increment(acknowledged as u64);
        acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::envelope::StorageNotification;
    use crate::extractor::MockFrameSampler;
    use crate::notifier::MockMessageQueue;
    use crate::object_store::MockObjectStore;
    use crate::orchestrator::{Collaborators, OrchestratorSettings};
    use crate::recorder::MockMetadataTable;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn record(receipt_handle: &str, body: String) -> QueueRecord {
        QueueRecord {
            message_id: Some(format!("id-{}", receipt_handle)),
            receipt_handle: Some(receipt_handle.to_string()),
            body,
        }
    }

    fn notification_body(key: &str) -> String {
        serde_json::to_string(&StorageNotification::for_object("uploads", key)).unwrap()
    }

    /// Orchestrator whose source bucket is empty
    fn orchestrator(scratch: &std::path::Path) -> Arc<Orchestrator> {
        let mut store = MockObjectStore::new();
        store
            .expect_head_object()
            .returning(|_, key| Err(StoreError::NotFound(key.to_string())));

        let mut table = MockMetadataTable::new();
        table.expect_put_record().returning(|_| Ok(()));

        let mut queue = MockMessageQueue::new();
        queue.expect_send().returning(|_| Ok("notification-1".to_string()));

        Arc::new(Orchestrator::new(
            Collaborators {
                object_store: Arc::new(store),
                frame_sampler: Arc::new(MockFrameSampler::new()),
                metadata_table: Arc::new(table),
                message_queue: Arc::new(queue),
            },
            OrchestratorSettings {
                scratch_dir: scratch.to_path_buf(),
                output_bucket: "frames-out".to_string(),
                link_ttl: Duration::from_secs(3600),
                record_retrieval_url: false,
                notification: NotificationConfig {
                    queue_url: "https://queue.test/notifications".to_string(),
                    receiver_email: "user@example.com".to_string(),
                    sender_email: "noreply@example.com".to_string(),
                    recipient_name: String::new(),
                    success_template: "SUCCESS_EMAIL_TEMPLATE".to_string(),
                    failure_template: "FAILURE_EMAIL_TEMPLATE".to_string(),
                },
            },
        ))
    }

    #[tokio::test]
    async fn test_poll_once_acknowledges_handled_messages_only() {
        let scratch = tempfile::tempdir().unwrap();

        let mut queue = MockIngestQueue::new();
        queue.expect_receive().times(1).returning(|| {
            Ok(vec![
                record("poison", "not json".to_string()),
                record("rejected", notification_body("badfilenamemp4")),
                record("aborted", notification_body("video1.1.mp4")),
            ])
        });
        queue
            .expect_acknowledge()
            .withf(|handle| handle == "poison" || handle == "rejected")
            .times(2)
            .returning(|_| Ok(()));

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        assert_eq!(consumer.poll_once().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_poll_once_with_empty_queue() {
        let scratch = tempfile::tempdir().unwrap();

        let mut queue = MockIngestQueue::new();
        queue.expect_receive().returning(|| Ok(Vec::new()));
        queue.expect_acknowledge().never();

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        assert_eq!(consumer.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_error_is_returned() {
        let scratch = tempfile::tempdir().unwrap();

        let mut queue = MockIngestQueue::new();
        queue
            .expect_receive()
            .returning(|| Err(StoreError::AccessDenied("queue".to_string())));

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        assert!(matches!(
            consumer.poll_once().await,
            Err(StoreError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let scratch = tempfile::tempdir().unwrap();

        let mut queue = MockIngestQueue::new();
        queue.expect_receive().never();

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        consumer.run(std::future::ready(())).await;
    }

    #[tokio::test]
    async fn test_run_finishes_in_flight_batch_before_stopping() {
        let scratch = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(tokio::sync::Notify::new());
        let acknowledged = Arc::new(AtomicBool::new(false));

        let mut queue = MockIngestQueue::new();
        let trigger = shutdown.clone();
        queue.expect_receive().times(1).returning(move || {
            // Shutdown is requested while this batch is being handled
            trigger.notify_one();
            Ok(vec![record("poison", "not json".to_string())])
        });
        let acked = acknowledged.clone();
        queue
            .expect_acknowledge()
            .withf(|handle| handle == "poison")
            .times(1)
            .returning(move |_| {
                acked.store(true, Ordering::SeqCst);
                Ok(())
            });

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        let signal = shutdown.clone();
        consumer.run(async move { signal.notified().await }).await;

        assert!(acknowledged.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_receive_backoff() {
        let scratch = tempfile::tempdir().unwrap();

        let mut queue = MockIngestQueue::new();
        queue
            .expect_receive()
            .times(1)
            .returning(|| Err(StoreError::Transport("connection refused".to_string())));
        queue.expect_acknowledge().never();

        let consumer = IngestConsumer::new(Arc::new(queue), orchestrator(scratch.path()));
        let started = std::time::Instant::now();
        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            consumer.run(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await;

        assert!(finished.is_ok());
        assert!(started.elapsed() < RECEIVE_ERROR_BACKOFF);
    }
}

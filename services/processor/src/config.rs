use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main configuration for the frame processor
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Shared AWS client configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// Inbound ingest queue
    pub ingest: IngestQueueConfig,
    /// Destination bucket configuration
    pub s3: S3Config,
    /// Metadata table configuration
    pub metadata: MetadataConfig,
    /// External transcoder configuration
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    /// Local scratch space
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Outbound notification queue
    pub notification: NotificationConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// AWS client configuration shared by S3, SQS and DynamoDB
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, MinIO, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style S3 access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Ingest queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestQueueConfig {
    /// URL of the queue carrying storage-change notifications
    pub queue_url: String,
    /// Maximum messages per receive call (1-10)
    #[serde(default = "default_max_messages")]
    pub max_messages: i32,
    /// Long-poll wait time in seconds (0-20)
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: i32,
    /// Visibility timeout applied to received messages
    pub visibility_timeout_secs: Option<i32>,
}

/// S3 output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket receiving frame archives
    pub output_bucket: String,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
}

/// Metadata table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// DynamoDB table name
    pub table_name: String,
    /// Store the presigned retrieval URL instead of the output URI
    #[serde(default)]
    pub record_retrieval_url: bool,
}

/// Transcoder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg executable
    #[serde(default = "default_transcoder_binary")]
    pub binary: PathBuf,
    /// Frames sampled per second of source video
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Output file pattern inside the frames directory
    #[serde(default = "default_frame_pattern")]
    pub frame_pattern: String,
}

/// Local working area configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding downloaded videos, frames and archives
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// URL of the queue consumed by the email dispatcher
    pub queue_url: String,
    /// Recipient address
    pub receiver_email: String,
    /// Sender address
    pub sender_email: String,
    /// Name used in the greeting placeholder
    #[serde(default)]
    pub recipient_name: String,
    /// Template used for successful jobs
    #[serde(default = "default_success_template")]
    pub success_template: String,
    /// Template used for rejected uploads
    #[serde(default = "default_failure_template")]
    pub failure_template: String,
}

// Default value functions
fn default_service_name() -> String {
    "frame-processor".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_messages() -> i32 {
    10
}

fn default_wait_time_secs() -> i32 {
    20
}

fn default_presigned_url_expiry_secs() -> u64 {
    crate::publisher::DEFAULT_LINK_TTL.as_secs()
}

fn default_transcoder_binary() -> PathBuf {
    PathBuf::from("/opt/bin/ffmpeg")
}

fn default_fps() -> u32 {
    1
}

fn default_frame_pattern() -> String {
    "frame_%04d.jpg".to_string()
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_success_template() -> String {
    "SUCCESS_EMAIL_TEMPLATE".to_string()
}

fn default_failure_template() -> String {
    "FAILURE_EMAIL_TEMPLATE".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/processor").required(false))
            .add_source(config::File::with_name("/etc/frame-processor/processor").required(false))
            // PROCESSOR__S3__OUTPUT_BUCKET -> s3.output_bucket
            .add_source(
                config::Environment::with_prefix("PROCESSOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let required = [
            ("ingest.queue_url", &self.ingest.queue_url),
            ("s3.output_bucket", &self.s3.output_bucket),
            ("metadata.table_name", &self.metadata.table_name),
            ("notification.queue_url", &self.notification.queue_url),
            ("notification.receiver_email", &self.notification.receiver_email),
            ("notification.sender_email", &self.notification.sender_email),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::MissingField(field.to_string()));
            }
        }

        if self.transcoder.fps == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "transcoder.fps".to_string(),
                message: "FPS must be greater than 0".to_string(),
            });
        }

        // Presigned URLs are capped at seven days
        if self.s3.presigned_url_expiry_secs == 0 || self.s3.presigned_url_expiry_secs > 604_800 {
            return Err(ConfigValidationError::InvalidValue {
                field: "s3.presigned_url_expiry_secs".to_string(),
                message: "Expiry must be between 1 and 604800 seconds".to_string(),
            });
        }

        if !(1..=10).contains(&self.ingest.max_messages) {
            return Err(ConfigValidationError::InvalidValue {
                field: "ingest.max_messages".to_string(),
                message: "Must be between 1 and 10".to_string(),
            });
        }

        if !(0..=20).contains(&self.ingest.wait_time_secs) {
            return Err(ConfigValidationError::InvalidValue {
                field: "ingest.wait_time_secs".to_string(),
                message: "Must be between 0 and 20".to_string(),
            });
        }

        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl AwsConfig {
    /// Load the shared AWS SDK configuration used by every client
    pub async fn load_sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()));

        // Custom endpoint for LocalStack
        if let Some(ref endpoint_url) = self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        loader.load().await
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_transcoder_binary(),
            fps: default_fps(),
            frame_pattern: default_frame_pattern(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
        }
    }
}

use anyhow::{Context, Result};
use frame_processor::config::ServiceConfig;
use frame_processor::{
    Collaborators, Config, DynamoDbTable, FfmpegSampler, IngestConsumer, Orchestrator,
    OrchestratorSettings, S3ObjectStore, SqsIngestQueue, SqsMessageQueue,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting frame processor"
    );

    config.validate().context("Invalid configuration")?;

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize AWS clients
    let sdk_config = config.aws.load_sdk_config().await;

    let collaborators = Collaborators {
        object_store: Arc::new(S3ObjectStore::new(&sdk_config, &config.aws)),
        frame_sampler: Arc::new(FfmpegSampler::new(&config.transcoder)),
        metadata_table: Arc::new(DynamoDbTable::new(&sdk_config, &config.metadata)),
        message_queue: Arc::new(SqsMessageQueue::new(&sdk_config, &config.notification.queue_url)),
    };

    tokio::fs::create_dir_all(&config.workspace.scratch_dir)
        .await
        .with_context(|| format!("Failed to create scratch dir {}", config.workspace.scratch_dir.display()))?;

    let orchestrator = Arc::new(Orchestrator::new(
        collaborators,
        OrchestratorSettings::from_config(&config),
    ));

    let ingest_queue = Arc::new(SqsIngestQueue::new(&sdk_config, &config.ingest));
    let consumer = IngestConsumer::new(ingest_queue, orchestrator);

    info!("Frame processor started successfully");

    consumer.run(shutdown_signal()).await;

    info!("Frame processor stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, finishing current batch");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, finishing current batch");
        }
    }
}

//! Bucket size monitor
//!
//! Tracks the total size of one bucket from its change notifications,
//! evicts the largest object when growth within the alarm window exceeds
//! the threshold, and renders the recent size history on demand.

use std::sync::Arc;

use anyhow::Result;
use bucket_monitor::{
    api,
    config::{MonitorConfig, ObjectBackend},
    pipeline::{self, Backends},
};
use monitor_lib::{
    health::HealthRegistry,
    observability::{MonitorMetrics, StructuredLogger},
    report,
    storage::{ChangeNotifier, MemoryObjectStore, ObjectStore, S3ObjectStore},
    timeseries::{FileTimeSeriesStore, MemoryTimeSeriesStore, TimeSeriesStore},
    EventRouter,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting bucket-monitor");

    let config = MonitorConfig::load()?;
    info!(
        source_bucket = %config.source_bucket,
        plot_bucket = %config.plot_bucket,
        backend = ?config.object_backend,
        "Monitor configured"
    );

    report::register_chart_font()?;

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new("bucket-monitor");
    logger.log_startup(MONITOR_VERSION, &config.source_bucket);

    let router = Arc::new(EventRouter::new());
    let backends = build_backends(&config, router.clone()).await?;

    let mut pipeline = pipeline::assemble(
        &config,
        router,
        backends,
        health_registry.clone(),
        metrics,
        logger.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = pipeline.spawn_consumers(&config, &shutdown_tx);

    tasks.push(tokio::spawn(pipeline::run_alarm_ticker(
        pipeline.state.evaluator.clone(),
        config.source_bucket.clone(),
        config.alarm_rule().window,
        health_registry.clone(),
        shutdown_tx.subscribe(),
    )));

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        pipeline.state.clone(),
        shutdown_tx.subscribe(),
    ));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Construct the object, artifact and time-series stores
async fn build_backends(config: &MonitorConfig, router: Arc<EventRouter>) -> Result<Backends> {
    let (objects, artifacts): (Arc<dyn ObjectStore>, Arc<dyn ObjectStore>) =
        match config.object_backend {
            ObjectBackend::Memory => {
                let notifier: Arc<dyn ChangeNotifier> = router;
                let objects: Arc<dyn ObjectStore> =
                    Arc::new(MemoryObjectStore::new().with_notifier(notifier));
                let artifacts: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
                (objects, artifacts)
            }
            ObjectBackend::S3 => {
                // Notifications arrive from the bucket's own event configuration
                let store: Arc<dyn ObjectStore> =
                    Arc::new(S3ObjectStore::new(&config.s3()).await);
                (store.clone(), store)
            }
        };

    let series: Arc<dyn TimeSeriesStore> = match &config.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "Using file-backed time series");
            Arc::new(FileTimeSeriesStore::open(dir.clone()).await?)
        }
        None => Arc::new(MemoryTimeSeriesStore::new()),
    };

    Ok(Backends {
        objects,
        artifacts,
        series,
    })
}

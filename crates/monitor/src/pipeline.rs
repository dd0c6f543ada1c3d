//! Wiring of the monitor pipeline
//!
//! The router fans every storage event out to two subscriptions. The
//! size-tracking subscription recomputes the bucket snapshot; the logging
//! subscription records the signed delta into the alarm window. The API
//! shares the same components.

use std::sync::Arc;
use std::time::Duration;

use monitor_lib::{
    alarm::{AlarmEvaluator, DeltaRecorder, Remediator},
    health::{components, HealthRegistry},
    ingestion::{run_consumer, ConsumerConfig, IngestionProcessor},
    observability::{MonitorMetrics, StructuredLogger},
    report::Reporter,
    router::Subscription,
    storage::ObjectStore,
    timeseries::TimeSeriesStore,
    EventRouter, MetricsAggregator,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::MonitorConfig;

pub const SIZE_TRACKING_SUBSCRIPTION: &str = "size-tracking";
pub const LOGGING_SUBSCRIPTION: &str = "logging";

/// Storage collaborators the pipeline runs against
pub struct Backends {
    pub objects: Arc<dyn ObjectStore>,
    pub artifacts: Arc<dyn ObjectStore>,
    pub series: Arc<dyn TimeSeriesStore>,
}

/// A subscription together with the processor that drains it
pub struct Consumer {
    pub subscription: Subscription,
    pub processor: Arc<IngestionProcessor>,
}

/// Fully wired pipeline, not yet running
pub struct Pipeline {
    pub state: Arc<AppState>,
    pub consumers: Vec<Consumer>,
}

/// Build every component and subscribe the consumers to `router`
pub fn assemble(
    config: &MonitorConfig,
    router: Arc<EventRouter>,
    backends: Backends,
    health_registry: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
) -> Pipeline {
    let timeout = config.backend_timeout();

    let aggregator = Arc::new(
        MetricsAggregator::new(
            backends.objects.clone(),
            backends.series.clone(),
            logger.clone(),
            metrics.clone(),
        )
        .with_timeout(timeout),
    );

    let recorder = Arc::new(DeltaRecorder::new(backends.series.clone()).with_timeout(timeout));

    let remediator = Arc::new(
        Remediator::new(backends.objects.clone(), logger.clone(), metrics.clone())
            .with_timeout(timeout),
    );

    let evaluator = Arc::new(
        AlarmEvaluator::new(
            backends.series.clone(),
            remediator,
            config.alarm_rule(),
            logger.clone(),
            metrics.clone(),
        )
        .with_timeout(timeout),
    );

    let reporter = Arc::new(
        Reporter::new(
            aggregator.clone(),
            backends.artifacts.clone(),
            config.plot_bucket.clone(),
            logger.clone(),
            metrics.clone(),
        )
        .with_window(config.report_window())
        .with_timeout(timeout),
    );

    let size_tracking = Consumer {
        subscription: router.subscribe(SIZE_TRACKING_SUBSCRIPTION),
        processor: Arc::new(
            IngestionProcessor::new(logger.clone(), metrics.clone()).with_sink(aggregator.clone()),
        ),
    };

    let logging = Consumer {
        subscription: router.subscribe(LOGGING_SUBSCRIPTION),
        processor: Arc::new(
            IngestionProcessor::new(logger.clone(), metrics.clone()).with_sink(recorder.clone()),
        ),
    };

    // Direct batch invocations through the API feed both stages at once
    let ingestion = Arc::new(
        IngestionProcessor::new(logger, metrics.clone())
            .with_sink(aggregator.clone())
            .with_sink(recorder),
    );

    let state = Arc::new(AppState {
        health_registry,
        metrics,
        source_bucket: config.source_bucket.clone(),
        objects: backends.objects,
        router,
        ingestion,
        aggregator,
        evaluator,
        reporter,
    });

    Pipeline {
        state,
        consumers: vec![size_tracking, logging],
    }
}

impl Pipeline {
    /// Spawn one task per consumer
    pub fn spawn_consumers(
        &mut self,
        config: &MonitorConfig,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let consumer_config = ConsumerConfig {
            invocation_timeout: config.backend_timeout(),
            health: Some(self.state.health_registry.clone()),
            ..ConsumerConfig::default()
        };

        self.consumers
            .drain(..)
            .map(|consumer| {
                tokio::spawn(run_consumer(
                    consumer.subscription,
                    consumer.processor,
                    consumer_config.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect()
    }
}

/// Evaluate the alarm once per `period` until shutdown
pub async fn run_alarm_ticker(
    evaluator: Arc<AlarmEvaluator>,
    source_name: String,
    period: Duration,
    health_registry: HealthRegistry,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(bucket = %source_name, period_secs = period.as_secs(), "Starting alarm ticker");

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let result = evaluator.evaluate(&source_name).await;
                health_registry.observe(components::EVALUATOR, &result).await;
                if let Err(e) = result {
                    warn!(bucket = %source_name, error = %e, "Alarm evaluation failed");
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down alarm ticker");
                break;
            }
        }
    }
}

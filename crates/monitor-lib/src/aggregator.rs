//! Bucket size aggregation
//!
//! Every recompute lists the whole bucket and appends a fresh snapshot. This
//! is a full recompute rather than an incremental update, so missed or
//! duplicated notifications never skew the recorded size.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::{format_utc, window_start, Clock, SystemClock};
use crate::error::{bounded, Result, DEFAULT_BACKEND_TIMEOUT};
use crate::ingestion::{async_trait, ChangeSink};
use crate::models::{ChangeEvent, SizeSnapshot};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::storage::ObjectStore;
use crate::timeseries::TimeSeriesStore;

/// Computes bucket totals and maintains the snapshot series
pub struct MetricsAggregator {
    objects: Arc<dyn ObjectStore>,
    series: Arc<dyn TimeSeriesStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl MetricsAggregator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        series: Arc<dyn TimeSeriesStore>,
        logger: StructuredLogger,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            objects,
            series,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_BACKEND_TIMEOUT,
            logger,
            metrics,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the bound on each backend call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current time on the aggregator's clock
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// List the bucket, total it up and append a snapshot stamped now
    pub async fn recompute_and_store(&self, source_name: &str) -> Result<SizeSnapshot> {
        let start = Instant::now();
        let objects = bounded("object store", self.timeout, self.objects.list(source_name)).await?;
        self.metrics
            .observe_backend_latency("list", start.elapsed().as_secs_f64());

        let total_size: u64 = objects.iter().map(|o| o.size).sum();
        let timestamp = self.clock.now();
        let snapshot = SizeSnapshot {
            source_name: source_name.to_string(),
            timestamp,
            timestamp_str: format_utc(timestamp),
            total_size,
            object_count: objects.len() as u64,
        };

        let start = Instant::now();
        bounded(
            "time-series store",
            self.timeout,
            self.series.append(snapshot.clone()),
        )
        .await?;
        self.metrics
            .observe_backend_latency("append_snapshot", start.elapsed().as_secs_f64());

        self.metrics.record_snapshot(&snapshot);
        self.logger.log_snapshot(&snapshot);
        Ok(snapshot)
    }

    /// Snapshots taken in the last `since_secs` seconds, oldest first
    pub async fn query_recent(&self, source_name: &str, since_secs: u64) -> Result<Vec<SizeSnapshot>> {
        let now = self.clock.now();
        let from = window_start(now, since_secs);

        let snapshots = bounded(
            "time-series store",
            self.timeout,
            self.series.query_range(source_name, from, now),
        )
        .await?;

        debug!(bucket = %source_name, from = from, to = now, rows = snapshots.len(), "Queried recent snapshots");
        Ok(snapshots)
    }

    /// Largest total size ever recorded, or 0 without any snapshot
    pub async fn query_max(&self, source_name: &str) -> Result<u64> {
        let snapshots = bounded(
            "time-series store",
            self.timeout,
            self.series.scan_all(source_name),
        )
        .await?;

        Ok(snapshots.iter().map(|s| s.total_size).max().unwrap_or(0))
    }
}

#[async_trait]
impl ChangeSink for MetricsAggregator {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<()> {
        self.recompute_and_store(&event.source_name).await.map(|_| ())
    }
}

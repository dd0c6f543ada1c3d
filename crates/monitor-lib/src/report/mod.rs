//! Size chart reporting
//!
//! A report reads the recent snapshots and the historical maximum, renders
//! them as a PNG chart and overwrites a fixed artifact in the plot bucket.

mod render;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::aggregator::MetricsAggregator;
use crate::clock::window_start;
use crate::error::{bounded, Result, DEFAULT_BACKEND_TIMEOUT};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::storage::ObjectStore;

pub use render::{
    chart_title, format_time_label, max_line_label, register_chart_font, render_size_chart,
    series_label, CHART_HEIGHT, CHART_WIDTH,
};

/// Artifact key, overwritten by every report
pub const PLOT_KEY: &str = "plot.png";

pub const PLOT_CONTENT_TYPE: &str = "image/png";

/// Default report window
pub const DEFAULT_REPORT_WINDOW: Duration = Duration::from_secs(10);

/// Whether the chart had any data behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Rendered,
    NoData,
}

/// Result of one report build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub status: ReportStatus,
    pub artifact_bucket: String,
    pub artifact_key: String,
    pub points: usize,
    pub max_size: u64,
    pub bytes: usize,
}

impl ReportOutcome {
    /// Human readable summary returned to the trigger caller
    pub fn message(&self) -> String {
        match self.status {
            ReportStatus::Rendered => format!(
                "Plot generated and uploaded to {}/{} ({} points, max {} bytes)",
                self.artifact_bucket, self.artifact_key, self.points, self.max_size
            ),
            ReportStatus::NoData => format!(
                "No data in report window, empty plot uploaded to {}/{}",
                self.artifact_bucket, self.artifact_key
            ),
        }
    }
}

/// Renders and publishes the size chart
pub struct Reporter {
    aggregator: Arc<MetricsAggregator>,
    artifacts: Arc<dyn ObjectStore>,
    artifact_bucket: String,
    window: Duration,
    timeout: Duration,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl Reporter {
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        artifacts: Arc<dyn ObjectStore>,
        artifact_bucket: impl Into<String>,
        logger: StructuredLogger,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            aggregator,
            artifacts,
            artifact_bucket: artifact_bucket.into(),
            window: DEFAULT_REPORT_WINDOW,
            timeout: DEFAULT_BACKEND_TIMEOUT,
            logger,
            metrics,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn artifact_bucket(&self) -> &str {
        &self.artifact_bucket
    }

    /// Render the recent size history of `source_name` and upload it.
    ///
    /// An empty window still produces and uploads a chart; the outcome is
    /// then `NoData`.
    pub async fn build_report(&self, source_name: &str) -> Result<ReportOutcome> {
        let window_secs = self.window.as_secs();
        let snapshots = self.aggregator.query_recent(source_name, window_secs).await?;
        let max_size = self.aggregator.query_max(source_name).await?;

        let now = self.aggregator.now();
        let png = render_size_chart(&snapshots, max_size, (window_start(now, window_secs), now))?;
        let bytes = png.len();

        let start = Instant::now();
        bounded(
            "artifact store",
            self.timeout,
            self.artifacts
                .put(&self.artifact_bucket, PLOT_KEY, png, PLOT_CONTENT_TYPE),
        )
        .await?;
        self.metrics
            .observe_backend_latency("put_artifact", start.elapsed().as_secs_f64());

        self.metrics.inc_reports_rendered();
        self.logger
            .log_report(source_name, PLOT_KEY, snapshots.len(), max_size);

        Ok(ReportOutcome {
            status: if snapshots.is_empty() {
                ReportStatus::NoData
            } else {
                ReportStatus::Rendered
            },
            artifact_bucket: self.artifact_bucket.clone(),
            artifact_key: PLOT_KEY.to_string(),
            points: snapshots.len(),
            max_size,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MonitorError;
    use crate::models::ObjectEntry;
    use crate::storage::{async_trait, MemoryObjectStore};
    use crate::timeseries::MemoryTimeSeriesStore;

    struct Harness {
        objects: MemoryObjectStore,
        artifacts: MemoryObjectStore,
        clock: ManualClock,
        aggregator: Arc<MetricsAggregator>,
    }

    fn harness() -> Harness {
        let objects = MemoryObjectStore::new();
        let clock = ManualClock::new(1_000);
        let aggregator = Arc::new(
            MetricsAggregator::new(
                Arc::new(objects.clone()),
                Arc::new(MemoryTimeSeriesStore::new()),
                StructuredLogger::new("test"),
                MonitorMetrics::new(),
            )
            .with_clock(Arc::new(clock.clone())),
        );
        Harness {
            objects,
            artifacts: MemoryObjectStore::new(),
            clock,
            aggregator,
        }
    }

    impl Harness {
        fn reporter(&self) -> Reporter {
            Reporter::new(
                self.aggregator.clone(),
                Arc::new(self.artifacts.clone()),
                "plots",
                StructuredLogger::new("test"),
                MonitorMetrics::new(),
            )
        }
    }

    #[tokio::test]
    async fn test_report_uploads_chart() {
        let h = harness();
        for (key, size) in [("a", 19usize), ("b", 28)] {
            h.objects.put("bucket", key, vec![0; size], "text/plain").await.unwrap();
            h.aggregator.recompute_and_store("bucket").await.unwrap();
            h.clock.advance(2);
        }

        let outcome = h.reporter().build_report("bucket").await.unwrap();

        assert_eq!(outcome.status, ReportStatus::Rendered);
        assert_eq!(outcome.points, 2);
        assert_eq!(outcome.max_size, 47);
        let (stored, content_type) = h.artifacts.get("plots", PLOT_KEY).unwrap();
        assert_eq!(stored.len(), outcome.bytes);
        assert_eq!(content_type, PLOT_CONTENT_TYPE);
        assert!(outcome.message().contains("plots/plot.png"));
    }

    #[tokio::test]
    async fn test_empty_window_still_uploads() {
        let h = harness();

        let outcome = h.reporter().build_report("bucket").await.unwrap();

        assert_eq!(outcome.status, ReportStatus::NoData);
        assert_eq!(outcome.points, 0);
        assert!(h.artifacts.get("plots", PLOT_KEY).is_some());
    }

    #[tokio::test]
    async fn test_old_snapshots_fall_out_of_window() {
        let h = harness();
        h.objects.put("bucket", "a", vec![0; 30], "text/plain").await.unwrap();
        h.aggregator.recompute_and_store("bucket").await.unwrap();
        h.clock.advance(60);

        let outcome = h.reporter().build_report("bucket").await.unwrap();

        assert_eq!(outcome.status, ReportStatus::NoData);
        assert_eq!(outcome.max_size, 30);
    }

    #[tokio::test]
    async fn test_repeated_reports_overwrite_artifact() {
        let h = harness();
        let reporter = h.reporter();

        reporter.build_report("bucket").await.unwrap();
        reporter.build_report("bucket").await.unwrap();

        assert_eq!(h.artifacts.len("plots"), 1);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl ObjectStore for ReadOnlyStore {
        async fn list(&self, _source_name: &str) -> Result<Vec<ObjectEntry>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _source_name: &str, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn put(&self, _source_name: &str, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            Err(MonitorError::backend("artifact store", "access denied"))
        }
    }

    #[tokio::test]
    async fn test_upload_failure_fails_invocation() {
        let h = harness();
        let reporter = Reporter::new(
            h.aggregator.clone(),
            Arc::new(ReadOnlyStore),
            "plots",
            StructuredLogger::new("test"),
            MonitorMetrics::new(),
        );

        let err = reporter.build_report("bucket").await.unwrap_err();
        assert!(err.is_invocation_failure());
    }
}

//! Observability infrastructure for the bucket size monitor
//!
//! Provides:
//! - Prometheus metrics (ingestion counts, snapshot sizes, alarm activity, backend latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_gauge_vec, HistogramVec,
    IntCounter, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{ChangeEvent, ObjectEntry, SizeSnapshot};

/// Default histogram buckets for backend latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 30.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    events_ingested: IntCounter,
    parse_errors: IntCounter,
    snapshots_written: IntCounter,
    bucket_size_bytes: IntGaugeVec,
    bucket_object_count: IntGaugeVec,
    alarm_window_sum_bytes: IntGaugeVec,
    alarm_evaluations: IntCounter,
    alarms_fired: IntCounter,
    evictions: IntCounter,
    reports_rendered: IntCounter,
    backend_latency_seconds: HistogramVec,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            events_ingested: register_int_counter!(
                "bucket_monitor_events_ingested_total",
                "Change events parsed from routed notifications"
            )
            .expect("Failed to register events_ingested"),

            parse_errors: register_int_counter!(
                "bucket_monitor_parse_errors_total",
                "Routed notifications skipped as malformed"
            )
            .expect("Failed to register parse_errors"),

            snapshots_written: register_int_counter!(
                "bucket_monitor_snapshots_written_total",
                "Size snapshots appended to the time-series store"
            )
            .expect("Failed to register snapshots_written"),

            bucket_size_bytes: register_int_gauge_vec!(
                "bucket_monitor_bucket_size_bytes",
                "Total bucket size at the latest snapshot",
                &["bucket"]
            )
            .expect("Failed to register bucket_size_bytes"),

            bucket_object_count: register_int_gauge_vec!(
                "bucket_monitor_bucket_object_count",
                "Object count at the latest snapshot",
                &["bucket"]
            )
            .expect("Failed to register bucket_object_count"),

            alarm_window_sum_bytes: register_int_gauge_vec!(
                "bucket_monitor_alarm_window_sum_bytes",
                "Sum of size deltas in the alarm window at the latest evaluation",
                &["bucket"]
            )
            .expect("Failed to register alarm_window_sum_bytes"),

            alarm_evaluations: register_int_counter!(
                "bucket_monitor_alarm_evaluations_total",
                "Alarm evaluations performed"
            )
            .expect("Failed to register alarm_evaluations"),

            alarms_fired: register_int_counter!(
                "bucket_monitor_alarms_fired_total",
                "Alarm evaluations that breached the threshold"
            )
            .expect("Failed to register alarms_fired"),

            evictions: register_int_counter!(
                "bucket_monitor_evictions_total",
                "Objects deleted by remediation"
            )
            .expect("Failed to register evictions"),

            reports_rendered: register_int_counter!(
                "bucket_monitor_reports_rendered_total",
                "Size charts rendered and uploaded"
            )
            .expect("Failed to register reports_rendered"),

            backend_latency_seconds: register_histogram_vec!(
                "bucket_monitor_backend_latency_seconds",
                "Latency of calls to storage, time-series and artifact backends",
                &["operation"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register backend_latency_seconds"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn inc_events_ingested(&self) {
        self.inner().events_ingested.inc();
    }

    pub fn inc_parse_errors(&self) {
        self.inner().parse_errors.inc();
    }

    /// Record a freshly written snapshot
    pub fn record_snapshot(&self, snapshot: &SizeSnapshot) {
        let inner = self.inner();
        inner.snapshots_written.inc();
        inner
            .bucket_size_bytes
            .with_label_values(&[snapshot.source_name.as_str()])
            .set(snapshot.total_size as i64);
        inner
            .bucket_object_count
            .with_label_values(&[snapshot.source_name.as_str()])
            .set(snapshot.object_count as i64);
    }

    /// Record an alarm evaluation and whether it breached
    pub fn record_evaluation(&self, source_name: &str, window_sum: i64, fired: bool) {
        let inner = self.inner();
        inner.alarm_evaluations.inc();
        inner
            .alarm_window_sum_bytes
            .with_label_values(&[source_name])
            .set(window_sum);
        if fired {
            inner.alarms_fired.inc();
        }
    }

    pub fn inc_evictions(&self) {
        self.inner().evictions.inc();
    }

    pub fn inc_reports_rendered(&self) {
        self.inner().reports_rendered.inc();
    }

    /// Record the latency of one backend operation
    pub fn observe_backend_latency(&self, operation: &str, duration_secs: f64) {
        self.inner()
            .backend_latency_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for changes, snapshots,
/// alarms and reports.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log one normalized change event
    pub fn log_change(&self, event: &ChangeEvent) {
        info!(
            event = "size_change",
            service = %self.service,
            bucket = %event.source_name,
            object_key = %event.object_key,
            action = %event.action,
            size_delta = event.size_delta,
            "Object size change"
        );
    }

    /// Log a notification that could not be parsed
    pub fn log_parse_error(&self, message_id: &str, error: &str) {
        warn!(
            event = "parse_error",
            service = %self.service,
            message_id = %message_id,
            error = %error,
            "Skipping malformed notification"
        );
    }

    /// Log a snapshot written by the aggregator
    pub fn log_snapshot(&self, snapshot: &SizeSnapshot) {
        info!(
            event = "snapshot_recorded",
            service = %self.service,
            bucket = %snapshot.source_name,
            timestamp = snapshot.timestamp,
            total_size = snapshot.total_size,
            object_count = snapshot.object_count,
            "Bucket size recorded"
        );
    }

    /// Log an alarm evaluation
    pub fn log_alarm(&self, source_name: &str, window_sum: i64, samples: usize, threshold: i64, fired: bool) {
        if fired {
            warn!(
                event = "alarm_fired",
                service = %self.service,
                bucket = %source_name,
                window_sum = window_sum,
                samples = samples,
                threshold = threshold,
                "Size growth threshold breached"
            );
        } else {
            info!(
                event = "alarm_evaluated",
                service = %self.service,
                bucket = %source_name,
                window_sum = window_sum,
                samples = samples,
                threshold = threshold,
                "Size growth within threshold"
            );
        }
    }

    /// Log an evicted object
    pub fn log_eviction(&self, source_name: &str, object: &ObjectEntry) {
        warn!(
            event = "object_evicted",
            service = %self.service,
            bucket = %source_name,
            object_key = %object.key,
            size = object.size,
            "Evicted largest object"
        );
    }

    /// Log a remediation that found nothing to evict
    pub fn log_empty_store(&self, source_name: &str) {
        info!(
            event = "eviction_skipped",
            service = %self.service,
            bucket = %source_name,
            "Bucket contains no objects to delete"
        );
    }

    /// Log a rendered report
    pub fn log_report(&self, source_name: &str, key: &str, points: usize, max_size: u64) {
        if points == 0 {
            warn!(
                event = "report_rendered",
                service = %self.service,
                bucket = %source_name,
                artifact = %key,
                points = points,
                max_size = max_size,
                "No snapshots in report window, rendered empty chart"
            );
        } else {
            info!(
                event = "report_rendered",
                service = %self.service,
                bucket = %source_name,
                artifact = %key,
                points = points,
                max_size = max_size,
                "Size chart rendered"
            );
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, source_name: &str) {
        info!(
            event = "monitor_started",
            service = %self.service,
            version = %version,
            bucket = %source_name,
            "Bucket size monitor started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            service = %self.service,
            reason = %reason,
            "Bucket size monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        let metrics = MonitorMetrics::new();

        metrics.inc_events_ingested();
        metrics.inc_parse_errors();
        metrics.record_snapshot(&SizeSnapshot {
            source_name: "bucket".into(),
            timestamp: 1,
            timestamp_str: String::new(),
            total_size: 47,
            object_count: 2,
        });
        metrics.record_evaluation("bucket", 38, true);
        metrics.inc_evictions();
        metrics.inc_reports_rendered();
        metrics.observe_backend_latency("list", 0.002);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "bucket_monitor_bucket_size_bytes"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("bucket-monitor");
        assert_eq!(logger.service, "bucket-monitor");
    }
}

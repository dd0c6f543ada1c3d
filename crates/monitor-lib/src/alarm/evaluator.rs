//! Size-growth alarm
//!
//! The alarm window is a query over the append-only delta series, so any
//! number of recorders and evaluators can share it without losing updates.
//! The alarm is edge-triggered: it fires when the window sum crosses the
//! threshold, runs remediation once, and drops straight back to normal. It
//! does not fire again until the sum has fallen back to the threshold or
//! below and crossed it anew.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Remediator;
use crate::clock::{window_start, Clock, SystemClock};
use crate::error::{bounded, MonitorError, Result, DEFAULT_BACKEND_TIMEOUT};
use crate::ingestion::{async_trait, ChangeSink};
use crate::models::{ChangeEvent, DeltaRecord};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::timeseries::TimeSeriesStore;

/// Default breach threshold in bytes
pub const DEFAULT_THRESHOLD_BYTES: i64 = 15;

/// Default alarm window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Threshold rule over a window of size deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmRule {
    /// Breach when the window sum is strictly greater than this
    pub threshold_bytes: i64,
    pub window: Duration,
}

impl Default for AlarmRule {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Alarm state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    #[default]
    Normal,
    Tripped,
}

/// What remediation did during a firing evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EvictionResult {
    Evicted { key: String, size: u64 },
    EmptyStore,
}

/// Outcome of one alarm evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvaluation {
    pub source_name: String,
    pub evaluated_at: i64,
    pub window_sum: i64,
    pub sample_count: usize,
    /// Window sum is above the threshold
    pub breached: bool,
    /// This evaluation observed the threshold crossing and remediated
    pub fired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction: Option<EvictionResult>,
}

/// Per-source alarm bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct SourceAlarm {
    state: AlarmState,
    /// The last evaluation saw the sum above the threshold
    above_threshold: bool,
}

/// Evaluates the size-growth rule and triggers remediation on a crossing
pub struct AlarmEvaluator {
    series: Arc<dyn TimeSeriesStore>,
    remediator: Arc<Remediator>,
    rule: AlarmRule,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    sources: RwLock<HashMap<String, SourceAlarm>>,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl AlarmEvaluator {
    pub fn new(
        series: Arc<dyn TimeSeriesStore>,
        remediator: Arc<Remediator>,
        rule: AlarmRule,
        logger: StructuredLogger,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            series,
            remediator,
            rule,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_BACKEND_TIMEOUT,
            sources: RwLock::new(HashMap::new()),
            logger,
            metrics,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rule(&self) -> AlarmRule {
        self.rule
    }

    pub fn state(&self, source_name: &str) -> AlarmState {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_name)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Record whether the sum is above the threshold and report whether this
    /// is a crossing. A crossing also trips the alarm, so concurrent
    /// evaluations of the same window cannot both claim it.
    fn observe_level(&self, source_name: &str, above: bool) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let alarm = sources.entry(source_name.to_string()).or_default();
        let crossed = above && !alarm.above_threshold;
        alarm.above_threshold = above;
        if crossed {
            alarm.state = AlarmState::Tripped;
        }
        crossed
    }

    /// Return to normal after remediation. A failed remediation forgets the
    /// crossing so that the next evaluation retries it.
    fn settle(&self, source_name: &str, retry: bool) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let alarm = sources.entry(source_name.to_string()).or_default();
        alarm.state = AlarmState::Normal;
        if retry {
            alarm.above_threshold = false;
        }
    }

    /// Evaluate the window ending now and remediate on a threshold crossing.
    ///
    /// A window without deltas is treated as not breaching. While the sum
    /// stays above the threshold, later evaluations report the breach but do
    /// not remediate again.
    pub async fn evaluate(&self, source_name: &str) -> Result<AlarmEvaluation> {
        let now = self.clock.now();
        let from = window_start(now, self.rule.window.as_secs());

        let start = Instant::now();
        let deltas = bounded(
            "time-series store",
            self.timeout,
            self.series.query_deltas(source_name, from, now),
        )
        .await?;
        self.metrics
            .observe_backend_latency("query_deltas", start.elapsed().as_secs_f64());

        let window_sum: i64 = deltas.iter().map(|d| d.size_delta).sum();
        let breached = !deltas.is_empty() && window_sum > self.rule.threshold_bytes;
        let fired = self.observe_level(source_name, breached);

        self.metrics.record_evaluation(source_name, window_sum, fired);
        self.logger.log_alarm(
            source_name,
            window_sum,
            deltas.len(),
            self.rule.threshold_bytes,
            fired,
        );

        let mut evaluation = AlarmEvaluation {
            source_name: source_name.to_string(),
            evaluated_at: now,
            window_sum,
            sample_count: deltas.len(),
            breached,
            fired,
            eviction: None,
        };

        if !fired {
            if breached {
                debug!(bucket = %source_name, window_sum, "Alarm already fired for this crossing");
            }
            return Ok(evaluation);
        }

        let remediation = self.remediator.evict(source_name).await;
        let failed = matches!(&remediation, Err(e) if !matches!(e, MonitorError::EmptyStore { .. }));
        self.settle(source_name, failed);

        evaluation.eviction = Some(match remediation {
            Ok(victim) => EvictionResult::Evicted {
                key: victim.key,
                size: victim.size,
            },
            Err(MonitorError::EmptyStore { .. }) => EvictionResult::EmptyStore,
            Err(e) => {
                warn!(bucket = %source_name, error = %e, "Remediation failed, crossing will be retried");
                return Err(e);
            }
        });

        Ok(evaluation)
    }
}

/// Records change deltas into the alarm window series
pub struct DeltaRecorder {
    series: Arc<dyn TimeSeriesStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl DeltaRecorder {
    pub fn new(series: Arc<dyn TimeSeriesStore>) -> Self {
        Self {
            series,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ChangeSink for DeltaRecorder {
    fn name(&self) -> &'static str {
        "delta_recorder"
    }

    async fn on_change(&self, event: &ChangeEvent) -> Result<()> {
        // Deltas are stamped on arrival, not with the store's event time
        let delta = DeltaRecord {
            source_name: event.source_name.clone(),
            timestamp: self.clock.now(),
            object_key: event.object_key.clone(),
            size_delta: event.size_delta,
        };

        debug!(bucket = %delta.source_name, size_delta = delta.size_delta, "Recording delta");
        bounded("time-series store", self.timeout, self.series.append_delta(delta)).await
    }
}

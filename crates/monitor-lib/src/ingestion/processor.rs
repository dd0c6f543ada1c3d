//! Ingestion processor

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::ChangeSink;
use crate::error::{MonitorError, Result};
use crate::models::{ChangeAction, ChangeEvent};
use crate::notification::{QueueRecord, OBJECT_CREATED_PREFIX, OBJECT_REMOVED_PREFIX};
use crate::observability::{MonitorMetrics, StructuredLogger};

/// Parse one queue record down to its change events.
///
/// Any defect in the envelope or in one of its storage records rejects the
/// whole queue record.
pub fn parse_record(record: &QueueRecord) -> Result<Vec<ChangeEvent>> {
    let notification = record.unwrap_notification()?;

    notification
        .records
        .iter()
        .map(|entry| {
            let action = if entry.event_name.starts_with(OBJECT_CREATED_PREFIX) {
                ChangeAction::Created
            } else if entry.event_name.starts_with(OBJECT_REMOVED_PREFIX) {
                ChangeAction::Removed
            } else {
                return Err(MonitorError::parse(format!(
                    "unsupported event name {}",
                    entry.event_name
                )));
            };

            if entry.s3.bucket.name.is_empty() || entry.s3.object.key.is_empty() {
                return Err(MonitorError::parse("record without bucket name or object key"));
            }

            Ok(ChangeEvent::new(
                entry.s3.bucket.name.clone(),
                entry.s3.object.key.clone(),
                action,
                entry.s3.object.size,
            ))
        })
        .collect()
}

/// A queue record that was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub message_id: String,
    pub error: String,
}

/// Result of parsing a batch
#[derive(Debug, Default)]
pub struct IngestionOutcome {
    pub events: Vec<ChangeEvent>,
    pub failures: Vec<RecordFailure>,
}

/// Summary returned to the invoker of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub received: usize,
    pub processed: usize,
    pub failed: Vec<RecordFailure>,
}

/// Normalizes routed notifications and forwards them to sinks
pub struct IngestionProcessor {
    sinks: Vec<Arc<dyn ChangeSink>>,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl IngestionProcessor {
    pub fn new(logger: StructuredLogger, metrics: MonitorMetrics) -> Self {
        Self {
            sinks: Vec::new(),
            logger,
            metrics,
        }
    }

    /// Add a sink; sinks are invoked in registration order
    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Parse a batch, skipping malformed records.
    ///
    /// Emits one structured log line per parsed event. Duplicated
    /// deliveries produce duplicated events.
    pub fn process_batch(&self, records: &[QueueRecord]) -> IngestionOutcome {
        let mut outcome = IngestionOutcome::default();

        for record in records {
            match parse_record(record) {
                Ok(events) => {
                    for event in events {
                        self.logger.log_change(&event);
                        self.metrics.inc_events_ingested();
                        outcome.events.push(event);
                    }
                }
                Err(e) => {
                    let error = e.to_string();
                    self.logger.log_parse_error(&record.message_id, &error);
                    self.metrics.inc_parse_errors();
                    outcome.failures.push(RecordFailure {
                        message_id: record.message_id.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }

    /// Parse a batch and forward every event to every sink.
    ///
    /// Parse failures are reported but never abort the batch; a sink
    /// failure aborts the invocation so the caller can retry it.
    pub async fn handle_batch(&self, records: &[QueueRecord]) -> Result<BatchReport> {
        let outcome = self.process_batch(records);

        for event in &outcome.events {
            for sink in &self.sinks {
                if let Err(e) = sink.on_change(event).await {
                    error!(
                        sink = sink.name(),
                        bucket = %event.source_name,
                        object_key = %event.object_key,
                        error = %e,
                        "Sink failed, aborting batch"
                    );
                    return Err(e);
                }
            }
        }

        debug!(
            received = records.len(),
            processed = outcome.events.len(),
            failed = outcome.failures.len(),
            "Batch handled"
        );

        Ok(BatchReport {
            received: records.len(),
            processed: outcome.events.len(),
            failed: outcome.failures,
        })
    }
}

//! Ingestion of routed storage notifications
//!
//! Turns queue batches into signed size deltas and forwards them to the
//! registered sinks (the aggregator and the alarm delta recorder).

mod consumer;
mod processor;

pub use consumer::{run_consumer, ConsumerConfig};
pub use processor::{parse_record, BatchReport, IngestionOutcome, IngestionProcessor, RecordFailure};

use crate::error::Result;
use crate::models::ChangeEvent;

pub use async_trait::async_trait;

/// Receiver of normalized change events
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Handle one change; an error aborts the current invocation
    async fn on_change(&self, event: &ChangeEvent) -> Result<()>;
}

//! Queue consumer loop
//!
//! Drains a router subscription in batches and hands each batch to an
//! ingestion processor, one invocation at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::IngestionProcessor;
use crate::error::{bounded, DEFAULT_BACKEND_TIMEOUT};
use crate::health::{components, HealthRegistry};
use crate::router::{Subscription, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RECEIVES};

/// Default pause before a failed batch is redelivered
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a queue consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum records per invocation
    pub batch_size: usize,
    /// Outer bound on one invocation
    pub invocation_timeout: Duration,
    /// Deliveries of a record before it is dead-lettered
    pub max_receives: u32,
    /// Pause after a failed invocation before its batch is redelivered
    pub retry_delay: Duration,
    /// Registry receiving the outcome of every invocation
    pub health: Option<HealthRegistry>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            invocation_timeout: DEFAULT_BACKEND_TIMEOUT,
            max_receives: DEFAULT_MAX_RECEIVES,
            retry_delay: DEFAULT_RETRY_DELAY,
            health: None,
        }
    }
}

/// Consume a subscription until shutdown or until the router goes away.
///
/// A failed invocation hands its whole batch back to the subscription for
/// redelivery after `retry_delay`. Records that fail `max_receives` times are
/// logged as dead letters and dropped.
pub async fn run_consumer(
    mut subscription: Subscription,
    processor: Arc<IngestionProcessor>,
    config: ConsumerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        subscriber = %subscription.name(),
        batch_size = config.batch_size,
        sinks = ?processor.sink_names(),
        "Starting queue consumer"
    );

    let mut invocations = 0u64;

    loop {
        tokio::select! {
            batch = subscription.next_batch(config.batch_size) => {
                let Some(batch) = batch else {
                    info!(subscriber = %subscription.name(), "Queue closed, stopping consumer");
                    break;
                };

                invocations += 1;
                let result = bounded(
                    "ingestion",
                    config.invocation_timeout,
                    processor.handle_batch(&batch),
                )
                .await;

                if let Some(health) = &config.health {
                    health.observe(components::INGESTION, &result).await;
                }

                let Err(e) = &result else {
                    subscription.ack(&batch);
                    continue;
                };

                warn!(
                    subscriber = %subscription.name(),
                    records = batch.len(),
                    invocation = invocations,
                    error = %e,
                    "Batch invocation failed"
                );

                let dead = subscription.requeue(batch, config.max_receives);
                for record in &dead {
                    error!(
                        event = "dead_letter",
                        subscriber = %subscription.name(),
                        message_id = %record.message_id,
                        receives = config.max_receives,
                        "Dropping record after repeated failures"
                    );
                }

                if subscription.pending_redelivery() > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(config.retry_delay) => {}
                        _ = shutdown.recv() => {
                            info!(subscriber = %subscription.name(), "Shutting down queue consumer");
                            break;
                        }
                    }
                }
            }
            _ = shutdown.recv() => {
                info!(subscriber = %subscription.name(), "Shutting down queue consumer");
                break;
            }
        }
    }
}

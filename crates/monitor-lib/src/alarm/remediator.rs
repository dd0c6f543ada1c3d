//! Remediation of runaway bucket growth

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{EvictionPolicy, LargestObjectPolicy};
use crate::error::{bounded, MonitorError, Result, DEFAULT_BACKEND_TIMEOUT};
use crate::models::ObjectEntry;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::storage::ObjectStore;

/// Deletes one object chosen by an eviction policy
pub struct Remediator {
    objects: Arc<dyn ObjectStore>,
    policy: Box<dyn EvictionPolicy>,
    timeout: Duration,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl Remediator {
    /// Create a remediator with the largest-object policy
    pub fn new(objects: Arc<dyn ObjectStore>, logger: StructuredLogger, metrics: MonitorMetrics) -> Self {
        Self {
            objects,
            policy: Box::new(LargestObjectPolicy),
            timeout: DEFAULT_BACKEND_TIMEOUT,
            logger,
            metrics,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Evict one object from the bucket.
    ///
    /// Fails with `EmptyStore` (after logging) when the policy finds nothing
    /// to delete.
    pub async fn evict(&self, source_name: &str) -> Result<ObjectEntry> {
        let start = Instant::now();
        let objects = bounded("object store", self.timeout, self.objects.list(source_name)).await?;
        self.metrics
            .observe_backend_latency("list", start.elapsed().as_secs_f64());

        let Some(victim) = self.policy.select(&objects).cloned() else {
            self.logger.log_empty_store(source_name);
            return Err(MonitorError::EmptyStore {
                source_name: source_name.to_string(),
            });
        };

        let start = Instant::now();
        bounded(
            "object store",
            self.timeout,
            self.objects.delete(source_name, &victim.key),
        )
        .await?;
        self.metrics
            .observe_backend_latency("delete", start.elapsed().as_secs_f64());

        self.metrics.inc_evictions();
        self.logger.log_eviction(source_name, &victim);
        Ok(victim)
    }
}

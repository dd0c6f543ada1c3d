//! Event router for storage change notifications
//!
//! Fans every published notification out to all subscribers. Each
//! subscriber owns a queue; records wait there until the subscriber drains
//! them in batches. Delivery is at-least-once from the point of view of the
//! consumers: the router never deduplicates, publishers may replay, and a
//! consumer hands failed records back for redelivery until they run out of
//! receives.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::notification::{QueueRecord, StorageEventNotification};
use crate::storage::ChangeNotifier;

/// Default maximum number of records handed to a consumer at once
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of deliveries before a record is dead-lettered
pub const DEFAULT_MAX_RECEIVES: u32 = 3;

struct Subscriber {
    name: String,
    tx: mpsc::UnboundedSender<QueueRecord>,
}

/// Topic-style fan-out router with one queue per subscriber
#[derive(Default)]
pub struct EventRouter {
    subscribers: RwLock<Vec<Subscriber>>,
    sequence: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber queue
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                name: name.clone(),
                tx,
            });

        debug!(subscriber = %name, "Subscriber registered");
        Subscription {
            name,
            rx,
            redelivery: VecDeque::new(),
            receives: HashMap::new(),
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish one notification to every subscriber.
    ///
    /// Returns the number of queues the notification was delivered to.
    /// Subscribers whose queue has been dropped are forgotten.
    pub fn publish(&self, notification: &StorageEventNotification) -> usize {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        subscribers.retain(|subscriber| {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let message_id = format!("{}-{}", subscriber.name, seq);

            let record = match QueueRecord::wrap(message_id, notification) {
                Ok(record) => record,
                Err(e) => {
                    warn!(subscriber = %subscriber.name, error = %e, "Dropping unencodable notification");
                    return true;
                }
            };

            match subscriber.tx.send(record) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    warn!(subscriber = %subscriber.name, "Subscriber queue closed, unsubscribing");
                    false
                }
            }
        });

        delivered
    }
}

impl ChangeNotifier for EventRouter {
    fn notify(&self, notification: StorageEventNotification) {
        let delivered = self.publish(&notification);
        debug!(subscribers = delivered, "Change notification routed");
    }
}

/// Receiving end of one subscriber queue
pub struct Subscription {
    name: String,
    rx: mpsc::UnboundedReceiver<QueueRecord>,
    /// Records handed back by the consumer, served before new ones
    redelivery: VecDeque<QueueRecord>,
    /// Deliveries so far of every unacknowledged record, by message id
    receives: HashMap<String, u32>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for at least one record, then take up to `max` queued records.
    ///
    /// Records waiting for redelivery come first. Returns `None` once the
    /// router is gone and the queue is drained.
    pub async fn next_batch(&mut self, max: usize) -> Option<Vec<QueueRecord>> {
        let max = max.max(1);
        let mut batch = Vec::with_capacity(max);

        while batch.len() < max {
            match self.redelivery.pop_front() {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            batch.push(self.rx.recv().await?);
        }

        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        for record in &batch {
            *self.receives.entry(record.message_id.clone()).or_insert(0) += 1;
        }
        Some(batch)
    }

    /// Forget the delivery counts of records that were handled
    pub fn ack(&mut self, records: &[QueueRecord]) {
        for record in records {
            self.receives.remove(&record.message_id);
        }
    }

    /// Hand failed records back for redelivery.
    ///
    /// Records already delivered `max_receives` times are not queued again
    /// and are returned as dead letters.
    pub fn requeue(&mut self, records: Vec<QueueRecord>, max_receives: u32) -> Vec<QueueRecord> {
        let mut dead = Vec::new();

        for record in records {
            let receives = self.receives.get(&record.message_id).copied().unwrap_or(0);
            if receives >= max_receives {
                self.receives.remove(&record.message_id);
                dead.push(record);
            } else {
                self.redelivery.push_back(record);
            }
        }

        dead
    }

    /// Records waiting for redelivery
    pub fn pending_redelivery(&self) -> usize {
        self.redelivery.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let router = EventRouter::new();
        let mut size_tracking = router.subscribe("size-tracking");
        let mut logging = router.subscribe("logging");

        let delivered = router.publish(&StorageEventNotification::created("b", "a.txt", 19));
        assert_eq!(delivered, 2);

        let a = size_tracking.next_batch(10).await.unwrap();
        let b = logging.next_batch(10).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_ne!(a[0].message_id, b[0].message_id);
        assert_eq!(a[0].unwrap_notification().unwrap(), b[0].unwrap_notification().unwrap());
    }

    #[tokio::test]
    async fn test_batches_are_capped() {
        let router = EventRouter::new();
        let mut sub = router.subscribe("logging");

        for i in 0..5 {
            router.publish(&StorageEventNotification::created("b", &format!("k{}", i), 1));
        }

        assert_eq!(sub.next_batch(3).await.unwrap().len(), 3);
        assert_eq!(sub.next_batch(3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_forgotten() {
        let router = EventRouter::new();
        let kept = router.subscribe("kept");
        drop(router.subscribe("dropped"));

        assert_eq!(router.publish(&StorageEventNotification::removed("b", "k", None)), 1);
        assert_eq!(router.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_queue_ends_when_router_dropped() {
        let router = EventRouter::new();
        let mut sub = router.subscribe("logging");
        router.publish(&StorageEventNotification::removed("b", "k", None));
        drop(router);

        assert_eq!(sub.next_batch(10).await.unwrap().len(), 1);
        assert!(sub.next_batch(10).await.is_none());
    }

    #[tokio::test]
    async fn test_requeued_records_are_redelivered_first() {
        let router = EventRouter::new();
        let mut sub = router.subscribe("size-tracking");

        router.publish(&StorageEventNotification::created("b", "first", 1));
        let failed = sub.next_batch(10).await.unwrap();
        router.publish(&StorageEventNotification::created("b", "second", 2));

        assert!(sub.requeue(failed.clone(), DEFAULT_MAX_RECEIVES).is_empty());
        assert_eq!(sub.pending_redelivery(), 1);

        let batch = sub.next_batch(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].message_id, failed[0].message_id);
        sub.ack(&batch);
        assert_eq!(sub.pending_redelivery(), 0);
    }

    #[tokio::test]
    async fn test_records_dead_letter_after_max_receives() {
        let router = EventRouter::new();
        let mut sub = router.subscribe("size-tracking");
        router.publish(&StorageEventNotification::created("b", "poison", 1));

        for _ in 0..2 {
            let batch = sub.next_batch(10).await.unwrap();
            assert!(sub.requeue(batch, 3).is_empty());
        }
        let batch = sub.next_batch(10).await.unwrap();
        let dead = sub.requeue(batch, 3);

        assert_eq!(dead.len(), 1);
        assert_eq!(sub.pending_redelivery(), 0);
    }
}

//! In-process object store
//!
//! Lists keys in lexicographic order, like the real store does, and can
//! publish change notifications so that deletions made by the remediator
//! flow back through the pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{async_trait, ChangeNotifier, ObjectStore};
use crate::error::Result;
use crate::models::ObjectEntry;
use crate::notification::StorageEventNotification;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Object store held entirely in memory
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<DashMap<String, BTreeMap<String, StoredObject>>>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a notification for every put and delete
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Read back an object's bytes and content type
    pub fn get(&self, source_name: &str, key: &str) -> Option<(Vec<u8>, String)> {
        self.buckets
            .get(source_name)
            .and_then(|bucket| bucket.get(key).map(|o| (o.data.clone(), o.content_type.clone())))
    }

    /// Number of objects in a bucket
    pub fn len(&self, source_name: &str) -> usize {
        self.buckets.get(source_name).map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, source_name: &str) -> bool {
        self.len(source_name) == 0
    }

    fn emit(&self, notification: StorageEventNotification) {
        if let Some(ref notifier) = self.notifier {
            notifier.notify(notification);
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, source_name: &str) -> Result<Vec<ObjectEntry>> {
        Ok(self
            .buckets
            .get(source_name)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(key, o)| ObjectEntry::new(key.clone(), o.data.len() as u64))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, source_name: &str, key: &str) -> Result<()> {
        let removed = self
            .buckets
            .get_mut(source_name)
            .and_then(|mut bucket| bucket.remove(key));

        // Deleting a missing key succeeds and still notifies, as the real store does
        let size = removed.map(|o| o.data.len() as u64);
        debug!(bucket = %source_name, key = %key, existed = size.is_some(), "Object deleted");
        self.emit(StorageEventNotification::removed(source_name, key, size));
        Ok(())
    }

    async fn put(
        &self,
        source_name: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let size = bytes.len() as u64;
        self.buckets
            .entry(source_name.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: bytes,
                    content_type: content_type.to_string(),
                },
            );

        debug!(bucket = %source_name, key = %key, size = size, "Object stored");
        self.emit(StorageEventNotification::created(source_name, key, size));
        Ok(())
    }
}

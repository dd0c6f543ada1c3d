//! Object storage collaborators
//!
//! The monitor only needs three operations from an object store: a full
//! listing, a delete and a put. Listing order is the store's native order,
//! which the eviction policy relies on for tie-breaking.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3StoreConfig};

use crate::error::Result;
use crate::models::ObjectEntry;
use crate::notification::StorageEventNotification;

pub use async_trait::async_trait;

/// Trait for object store implementations
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object currently in the bucket, in native listing order
    async fn list(&self, source_name: &str) -> Result<Vec<ObjectEntry>>;

    /// Delete one object
    async fn delete(&self, source_name: &str, key: &str) -> Result<()>;

    /// Store an object, replacing any existing one under the same key
    async fn put(&self, source_name: &str, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<()>;
}

/// Receiver of change notifications emitted by an object store
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, notification: StorageEventNotification);
}

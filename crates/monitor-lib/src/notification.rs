//! Wire formats for storage change notifications
//!
//! A change travels through three nested envelopes:
//! - the storage event notification (`{"Records": [{"eventName", "s3": ...}]}`)
//! - the topic envelope, carrying the notification as a JSON string in `Message`
//! - the queue record, carrying the topic envelope as a JSON string in `body`

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Event name prefix for object creation
pub const OBJECT_CREATED_PREFIX: &str = "ObjectCreated";
/// Event name prefix for object removal
pub const OBJECT_REMOVED_PREFIX: &str = "ObjectRemoved";

/// Storage event notification as emitted by the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEventNotification {
    #[serde(rename = "Records")]
    pub records: Vec<StorageEventRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEventRecord {
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    /// Absent on removal notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl StorageEventNotification {
    /// Notification for a stored object
    pub fn created(bucket: &str, key: &str, size: u64) -> Self {
        Self::single(format!("{}:Put", OBJECT_CREATED_PREFIX), bucket, key, Some(size))
    }

    /// Notification for a deleted object; `size` is the size it had, if known
    pub fn removed(bucket: &str, key: &str, size: Option<u64>) -> Self {
        Self::single(format!("{}:Delete", OBJECT_REMOVED_PREFIX), bucket, key, size)
    }

    fn single(event_name: String, bucket: &str, key: &str, size: Option<u64>) -> Self {
        Self {
            records: vec![StorageEventRecord {
                event_name,
                event_time: Some(chrono::Utc::now().to_rfc3339()),
                s3: S3Entity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: key.to_string(),
                        size,
                    },
                },
            }],
        }
    }
}

/// Topic envelope wrapping a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEnvelope {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "Message")]
    pub message: String,
}

/// One record of a queue delivery batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    #[serde(default)]
    pub message_id: String,
    pub body: String,
}

/// A queue delivery batch, as handed to a consumer invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

impl QueueRecord {
    /// Wrap a notification in the topic and queue envelopes
    pub fn wrap(message_id: impl Into<String>, notification: &StorageEventNotification) -> Result<Self> {
        let message = serde_json::to_string(notification)
            .map_err(|e| MonitorError::parse(format!("unencodable notification: {}", e)))?;
        let envelope = TopicEnvelope {
            kind: Some("Notification".to_string()),
            message,
        };
        let body = serde_json::to_string(&envelope)
            .map_err(|e| MonitorError::parse(format!("unencodable envelope: {}", e)))?;

        Ok(Self {
            message_id: message_id.into(),
            body,
        })
    }

    /// Unwrap the queue and topic envelopes down to the storage notification
    pub fn unwrap_notification(&self) -> Result<StorageEventNotification> {
        let envelope: TopicEnvelope = serde_json::from_str(&self.body)
            .map_err(|e| MonitorError::parse(format!("invalid queue body: {}", e)))?;
        let notification: StorageEventNotification = serde_json::from_str(&envelope.message)
            .map_err(|e| MonitorError::parse(format!("invalid topic message: {}", e)))?;

        if notification.records.is_empty() {
            return Err(MonitorError::parse("notification carries no records"));
        }

        Ok(notification)
    }
}

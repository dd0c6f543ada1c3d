//! Core data models for the bucket size monitor

use serde::{Deserialize, Serialize};

/// One recorded size measurement of a storage source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSnapshot {
    pub source_name: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Human-readable UTC timestamp (`%Y-%m-%d %H:%M:%S`)
    #[serde(default)]
    pub timestamp_str: String,
    pub total_size: u64,
    pub object_count: u64,
}

/// Kind of change reported by the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Removed,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Created => write!(f, "created"),
            ChangeAction::Removed => write!(f, "removed"),
        }
    }
}

/// Normalized change derived from a single storage notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source_name: String,
    pub object_key: String,
    pub action: ChangeAction,
    /// `+size` for created objects, `-size` for removed ones, `0` when unknown
    pub size_delta: i64,
}

impl ChangeEvent {
    pub fn new(
        source_name: impl Into<String>,
        object_key: impl Into<String>,
        action: ChangeAction,
        size: Option<u64>,
    ) -> Self {
        let size = size.unwrap_or(0) as i64;
        let size_delta = match action {
            ChangeAction::Created => size,
            ChangeAction::Removed => -size,
        };

        Self {
            source_name: source_name.into(),
            object_key: object_key.into(),
            action,
            size_delta,
        }
    }
}

/// A size delta persisted for alarm window queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub source_name: String,
    pub timestamp: i64,
    pub object_key: String,
    pub size_delta: i64,
}

/// Object as listed by the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

//! In-process time-series store

use std::sync::Arc;

use dashmap::DashMap;

use super::{async_trait, select_range, TimeSeriesStore};
use crate::error::Result;
use crate::models::{DeltaRecord, SizeSnapshot};

/// Time-series store held in memory, keyed by source name
#[derive(Clone, Default)]
pub struct MemoryTimeSeriesStore {
    snapshots: Arc<DashMap<String, Vec<SizeSnapshot>>>,
    deltas: Arc<DashMap<String, Vec<DeltaRecord>>>,
}

impl MemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots stored for a source
    pub fn snapshot_count(&self, source_name: &str) -> usize {
        self.snapshots.get(source_name).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    async fn append(&self, snapshot: SizeSnapshot) -> Result<()> {
        self.snapshots
            .entry(snapshot.source_name.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn query_range(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<SizeSnapshot>> {
        Ok(self
            .snapshots
            .get(source_name)
            .map(|rows| select_range(rows.as_slice(), from, to, |s: &SizeSnapshot| s.timestamp))
            .unwrap_or_default())
    }

    async fn scan_all(&self, source_name: &str) -> Result<Vec<SizeSnapshot>> {
        Ok(self
            .snapshots
            .get(source_name)
            .map(|rows| rows.value().clone())
            .unwrap_or_default())
    }

    async fn append_delta(&self, delta: DeltaRecord) -> Result<()> {
        self.deltas
            .entry(delta.source_name.clone())
            .or_default()
            .push(delta);
        Ok(())
    }

    async fn query_deltas(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<DeltaRecord>> {
        Ok(self
            .deltas
            .get(source_name)
            .map(|rows| select_range(rows.as_slice(), from, to, |d: &DeltaRecord| d.timestamp))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(source: &str, timestamp: i64, total_size: u64) -> SizeSnapshot {
        SizeSnapshot {
            source_name: source.to_string(),
            timestamp,
            timestamp_str: String::new(),
            total_size,
            object_count: 1,
        }
    }

    #[tokio::test]
    async fn test_query_range_is_inclusive_and_sorted() {
        let store = MemoryTimeSeriesStore::new();
        // Concurrent writers may append out of order
        store.append(snapshot("b", 105, 3)).await.unwrap();
        store.append(snapshot("b", 100, 1)).await.unwrap();
        store.append(snapshot("b", 110, 4)).await.unwrap();
        store.append(snapshot("b", 111, 5)).await.unwrap();

        let rows = store.query_range("b", 100, 110).await.unwrap();
        let stamps: Vec<i64> = rows.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![100, 105, 110]);
    }

    #[tokio::test]
    async fn test_sources_are_isolated() {
        let store = MemoryTimeSeriesStore::new();
        store.append(snapshot("a", 100, 1)).await.unwrap();
        store.append(snapshot("b", 100, 2)).await.unwrap();

        assert_eq!(store.scan_all("a").await.unwrap().len(), 1);
        assert_eq!(store.snapshot_count("b"), 1);
        assert!(store.scan_all("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_deltas() {
        let store = MemoryTimeSeriesStore::new();
        for (ts, delta) in [(90, 5), (95, 19), (100, -19)] {
            store
                .append_delta(DeltaRecord {
                    source_name: "b".into(),
                    timestamp: ts,
                    object_key: "k".into(),
                    size_delta: delta,
                })
                .await
                .unwrap();
        }

        let window = store.query_deltas("b", 95, 105).await.unwrap();
        let sum: i64 = window.iter().map(|d| d.size_delta).sum();
        assert_eq!(window.len(), 2);
        assert_eq!(sum, 0);
    }
}

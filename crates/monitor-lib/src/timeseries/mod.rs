//! Append-only time-series storage
//!
//! Holds two series per source: size snapshots written by the aggregator and
//! size deltas written by the delta recorder. Rows are never updated or
//! removed, so concurrent writers cannot lose each other's updates.

mod file;
mod memory;

pub use file::FileTimeSeriesStore;
pub use memory::MemoryTimeSeriesStore;

use crate::error::Result;
use crate::models::{DeltaRecord, SizeSnapshot};

pub use async_trait::async_trait;

/// Trait for time-series store implementations
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Append one snapshot
    async fn append(&self, snapshot: SizeSnapshot) -> Result<()>;

    /// Snapshots with `from <= timestamp <= to`, ascending by timestamp
    async fn query_range(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<SizeSnapshot>>;

    /// Every snapshot ever recorded for a source
    async fn scan_all(&self, source_name: &str) -> Result<Vec<SizeSnapshot>>;

    /// Append one size delta
    async fn append_delta(&self, delta: DeltaRecord) -> Result<()>;

    /// Deltas with `from <= timestamp <= to`, ascending by timestamp
    async fn query_deltas(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<DeltaRecord>>;
}

/// Filter rows of one source to an inclusive time range, ascending
pub(crate) fn select_range<T: Clone>(
    rows: &[T],
    from: i64,
    to: i64,
    timestamp: impl Fn(&T) -> i64,
) -> Vec<T> {
    let mut selected: Vec<T> = rows
        .iter()
        .filter(|row| {
            let ts = timestamp(row);
            ts >= from && ts <= to
        })
        .cloned()
        .collect();
    // Stable: rows sharing a timestamp keep insertion order
    selected.sort_by_key(|row| timestamp(row));
    selected
}

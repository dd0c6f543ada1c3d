//! File-backed time-series store
//!
//! Each series is a JSON-lines file that is only ever appended to:
//! - `snapshots.jsonl` for size snapshots
//! - `deltas.jsonl` for size deltas
//!
//! Files are replayed into memory on open; queries are served from memory.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{async_trait, MemoryTimeSeriesStore, TimeSeriesStore};
use crate::error::{MonitorError, Result};
use crate::models::{DeltaRecord, SizeSnapshot};

const BACKEND: &str = "time-series store";
const SNAPSHOT_FILE: &str = "snapshots.jsonl";
const DELTA_FILE: &str = "deltas.jsonl";

/// Time-series store persisted as append-only JSON-lines files
pub struct FileTimeSeriesStore {
    dir: PathBuf,
    cache: MemoryTimeSeriesStore,
    /// Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl FileTimeSeriesStore {
    /// Open (or create) a store rooted at `dir`, replaying existing rows
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let cache = MemoryTimeSeriesStore::new();

        let snapshots: Vec<SizeSnapshot> = load_lines(&dir.join(SNAPSHOT_FILE)).await?;
        let snapshot_count = snapshots.len();
        for snapshot in snapshots {
            cache.append(snapshot).await?;
        }

        let deltas: Vec<DeltaRecord> = load_lines(&dir.join(DELTA_FILE)).await?;
        let delta_count = deltas.len();
        for delta in deltas {
            cache.append_delta(delta).await?;
        }

        info!(
            path = %dir.display(),
            snapshots = snapshot_count,
            deltas = delta_count,
            "Time-series store opened"
        );

        Ok(Self {
            dir,
            cache,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append_line<T: Serialize>(&self, file_name: &str, row: &T) -> Result<()> {
        let mut line = serde_json::to_vec(row)
            .map_err(|e| MonitorError::backend(BACKEND, format!("serialize row: {}", e)))?;
        line.push(b'\n');

        let path = self.dir.join(file_name);
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        file.write_all(&line).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), bytes = line.len(), "Row appended");
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> MonitorError {
    MonitorError::backend(BACKEND, format!("{}: {}", path.display(), e))
}

/// Read every parseable row of a JSON-lines file; a missing file is empty.
///
/// A final line without its newline is either completed (when it parses) or
/// cut off, so the next append starts on a fresh line.
async fn load_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let mut rows = Vec::new();
    for (line_no, line) in content.split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "Skipping unreadable row"
            ),
        }
    }

    repair_tail::<T>(path, &content).await?;
    Ok(rows)
}

async fn repair_tail<T: DeserializeOwned>(path: &Path, content: &[u8]) -> Result<()> {
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(());
    }

    let tail_start = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let tail = &content[tail_start..];

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| io_error(path, e))?;

    if serde_json::from_slice::<T>(tail).is_ok() {
        file.seek(std::io::SeekFrom::End(0))
            .await
            .map_err(|e| io_error(path, e))?;
        file.write_all(b"\n").await.map_err(|e| io_error(path, e))?;
        debug!(path = %path.display(), "Completed final row");
    } else {
        file.set_len(tail_start as u64)
            .await
            .map_err(|e| io_error(path, e))?;
        warn!(path = %path.display(), bytes = tail.len(), "Truncated torn final row");
    }

    file.flush().await.map_err(|e| io_error(path, e))?;
    Ok(())
}

#[async_trait]
impl TimeSeriesStore for FileTimeSeriesStore {
    async fn append(&self, snapshot: SizeSnapshot) -> Result<()> {
        self.append_line(SNAPSHOT_FILE, &snapshot).await?;
        self.cache.append(snapshot).await
    }

    async fn query_range(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<SizeSnapshot>> {
        self.cache.query_range(source_name, from, to).await
    }

    async fn scan_all(&self, source_name: &str) -> Result<Vec<SizeSnapshot>> {
        self.cache.scan_all(source_name).await
    }

    async fn append_delta(&self, delta: DeltaRecord) -> Result<()> {
        self.append_line(DELTA_FILE, &delta).await?;
        self.cache.append_delta(delta).await
    }

    async fn query_deltas(&self, source_name: &str, from: i64, to: i64) -> Result<Vec<DeltaRecord>> {
        self.cache.query_deltas(source_name, from, to).await
    }
}

use super::{LaneRecord, MemoryResultSink, ResultSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::traffic::FrameReport;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends one JSON line per lane result to a file.
///
/// Recent results are served from an in-memory tail so trend queries never re-read the file.
pub struct JsonlResultSink {
    path: PathBuf,
    file: Mutex<File>,
    tail: MemoryResultSink,
}

impl JsonlResultSink {
    pub async fn open(path: impl AsRef<Path>, tail_capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open result file {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            tail: MemoryResultSink::new(tail_capacity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlResultSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn record(&self, session_id: &str, report: &FrameReport) -> Result<()> {
        let mut buf = Vec::new();
        for record in LaneRecord::from_report(session_id, report) {
            serde_json::to_writer(&mut buf, &record).context("Failed to serialize lane record")?;
            buf.push(b'\n');
        }

        {
            let mut file = self.file.lock().await;
            file.write_all(&buf)
                .await
                .with_context(|| format!("Failed to append to {}", self.path.display()))?;
            file.flush().await?;
        }
        debug!(session_id = %session_id, bytes = buf.len(), "Appended lane records");

        self.tail.record(session_id, report).await
    }

    async fn recent(&self, session_id: &str, lane: &str, limit: usize) -> Result<Vec<LaneRecord>> {
        self.tail.recent(session_id, lane, limit).await
    }

    async fn forget(&self, session_id: &str) -> Result<()> {
        self.tail.forget(session_id).await
    }
}

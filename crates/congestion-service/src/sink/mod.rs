pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlResultSink;
pub use memory::MemoryResultSink;

use anyhow::Result;
use async_trait::async_trait;
use common::traffic::{FrameReport, LaneResult};
use serde::{Deserialize, Serialize};

/// One persisted per-lane result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneRecord {
    pub session_id: String,
    pub frame_index: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,

    #[serde(flatten)]
    pub result: LaneResult,
}

impl LaneRecord {
    /// Flatten a frame report into one record per lane
    pub fn from_report(session_id: &str, report: &FrameReport) -> Vec<Self> {
        report
            .lanes
            .iter()
            .map(|result| Self {
                session_id: session_id.to_string(),
                frame_index: report.frame_index,
                timestamp_ms: report.timestamp_ms,
                result: result.clone(),
            })
            .collect()
    }
}

/// Downstream consumer of per-lane results (logging, persistence, dashboards)
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short identifier used in metrics and logs
    fn name(&self) -> &'static str;

    /// Persist every lane result of a processed frame
    async fn record(&self, session_id: &str, report: &FrameReport) -> Result<()>;

    /// Up to `limit` most recent records of a lane, oldest first
    async fn recent(&self, session_id: &str, lane: &str, limit: usize) -> Result<Vec<LaneRecord>>;

    /// Drop any retained results of a session
    async fn forget(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}

use super::{LaneRecord, ResultSink};
use anyhow::Result;
use async_trait::async_trait;
use common::traffic::FrameReport;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub const DEFAULT_MEMORY_SINK_CAPACITY: usize = 500;

type LaneKey = (String, String);

/// Keeps the most recent results of every (session, lane) in memory
pub struct MemoryResultSink {
    capacity: usize,
    lanes: RwLock<HashMap<LaneKey, VecDeque<LaneRecord>>>,
}

impl MemoryResultSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lanes: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of results retained for a lane
    pub async fn len(&self, session_id: &str, lane: &str) -> usize {
        let lanes = self.lanes.read().await;
        lanes
            .get(&(session_id.to_string(), lane.to_string()))
            .map_or(0, VecDeque::len)
    }
}

impl Default for MemoryResultSink {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SINK_CAPACITY)
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record(&self, session_id: &str, report: &FrameReport) -> Result<()> {
        let mut lanes = self.lanes.write().await;
        for record in LaneRecord::from_report(session_id, report) {
            let buf = lanes
                .entry((session_id.to_string(), record.result.lane.clone()))
                .or_insert_with(|| VecDeque::with_capacity(self.capacity));
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(record);
        }
        Ok(())
    }

    async fn recent(&self, session_id: &str, lane: &str, limit: usize) -> Result<Vec<LaneRecord>> {
        let lanes = self.lanes.read().await;
        let Some(buf) = lanes.get(&(session_id.to_string(), lane.to_string())) else {
            return Ok(Vec::new());
        };
        let skip = buf.len().saturating_sub(limit);
        Ok(buf.iter().skip(skip).cloned().collect())
    }

    async fn forget(&self, session_id: &str) -> Result<()> {
        let mut lanes = self.lanes.write().await;
        lanes.retain(|(session, _), _| session != session_id);
        Ok(())
    }
}

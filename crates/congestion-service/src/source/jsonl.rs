use super::TrackSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::traffic::TrackedFrame;
use common::validation::validate_tracked_frame;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Reads one `TrackedFrame` JSON document per line; blank lines are skipped
pub struct JsonlTrackSource {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonlTrackSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open frame file {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

#[async_trait]
impl TrackSource for JsonlTrackSource {
    async fn next_frame(&mut self) -> Result<Option<TrackedFrame>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let frame: TrackedFrame = serde_json::from_str(line)
                .with_context(|| format!("Malformed frame on line {}", self.line_no))?;
            validate_tracked_frame(&frame)
                .with_context(|| format!("Invalid frame on line {}", self.line_no))?;
            return Ok(Some(frame));
        }
        Ok(None)
    }
}

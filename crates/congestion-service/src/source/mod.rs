pub mod jsonl;
pub mod synthetic;

pub use jsonl::JsonlTrackSource;
pub use synthetic::SyntheticTraffic;

use anyhow::Result;
use async_trait::async_trait;
use common::traffic::TrackedFrame;

/// Supplier of tracked frames, standing in for the external detector and tracker
#[async_trait]
pub trait TrackSource: Send {
    /// Next frame in stream order; `None` once the stream is exhausted
    async fn next_frame(&mut self) -> Result<Option<TrackedFrame>>;
}

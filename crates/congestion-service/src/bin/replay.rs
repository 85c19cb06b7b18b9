//! Offline congestion replay
//!
//! Runs a recorded stream of tracked frames (one JSON document per line) through the
//! congestion pipeline and prints the final lane states.
//!
//! Usage:
//!   congestion-replay --calibration lanes.json --frames tracks.jsonl
//!   congestion-replay --calibration lanes.json --synthetic 25 --synthetic-velocity 0
//!   congestion-replay --calibration lanes.json --frames tracks.jsonl --output results.jsonl
//!   congestion-replay --auto-calibrate --frames tracks.jsonl

use anyhow::{Context, Result};
use clap::Parser;
use congestion_service::{
    engine::{AutoCalibrator, CongestionConfig, CongestionPipeline, LaneCalibration},
    sink::{JsonlResultSink, ResultSink},
    source::{JsonlTrackSource, SyntheticTraffic, TrackSource},
};
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const REPLAY_SESSION: &str = "replay";

#[derive(Parser)]
#[command(name = "congestion-replay")]
#[command(about = "Replay tracked frames through the lane congestion pipeline", long_about = None)]
struct Cli {
    /// Lane polygon calibration file
    #[arg(long, env = "LANE_CALIBRATION", required_unless_present = "auto_calibrate")]
    calibration: Option<PathBuf>,

    /// Infer two lanes from the first observed vehicle positions instead of a calibration file
    #[arg(long, conflicts_with = "calibration")]
    auto_calibrate: bool,

    /// Tracked frames, one JSON document per line
    #[arg(long, required_unless_present = "synthetic")]
    frames: Option<PathBuf>,

    /// Generate this many synthetic cars instead of reading frames
    #[arg(long, conflicts_with = "frames")]
    synthetic: Option<usize>,

    /// Number of synthetic frames
    #[arg(long, default_value_t = 30)]
    synthetic_frames: u64,

    /// Synthetic displacement per frame along x, in pixels
    #[arg(long, default_value_t = 2.0)]
    synthetic_velocity: f64,

    /// Capture rate of the source stream
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Process every Nth frame
    #[arg(long, default_value_t = 1)]
    stride: u64,

    /// Occupancy weight of a full lane
    #[arg(long, default_value_t = 60.0)]
    road_capacity: f64,

    /// Congestion smoothing window in frames
    #[arg(long, default_value_t = 15)]
    window_size: usize,

    /// Append per-lane results to this JSONL file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("congestion-replay");
    let cli = Cli::parse();

    let config = CongestionConfig {
        road_capacity: cli.road_capacity,
        window_size: cli.window_size,
        frame_stride: cli.stride,
        nominal_fps: cli.fps,
        ..Default::default()
    }
    .validate()
    .context("Invalid replay configuration")?;

    let mut pipeline = match &cli.calibration {
        Some(path) => {
            let calibration = LaneCalibration::load(path)?;
            info!(lanes = ?calibration.lane_ids(), "Loaded lane calibration");
            Some(CongestionPipeline::new(calibration, config.clone())?)
        }
        None => None,
    };
    let mut calibrator = AutoCalibrator::default();

    info!(
        effective_fps = config.effective_fps(),
        auto_calibrate = pipeline.is_none(),
        "Starting replay"
    );

    let mut source: Box<dyn TrackSource> = match (&cli.frames, cli.synthetic) {
        (Some(path), _) => Box::new(JsonlTrackSource::open(path).await?),
        (None, Some(vehicles)) => Box::new(
            SyntheticTraffic::new(vehicles, cli.synthetic_frames)
                .velocity(cli.synthetic_velocity, 0.0)
                .with_fps(cli.fps),
        ),
        (None, None) => anyhow::bail!("either --frames or --synthetic is required"),
    };

    let sink = match &cli.output {
        Some(path) => Some(JsonlResultSink::open(path, 1).await?),
        None => None,
    };

    let mut frames_read = 0u64;
    while let Some(frame) = source.next_frame().await? {
        frames_read += 1;

        if pipeline.is_none() {
            calibrator.observe(&frame.objects);
            if !calibrator.is_ready() {
                continue;
            }
            match calibrator.calibrate() {
                Ok(calibration) => {
                    info!(
                        observed = calibrator.observed(),
                        road_roi = ?calibrator.road_roi(),
                        frame_index = frame.frame_index,
                        "Auto-calibrated lanes"
                    );
                    pipeline = Some(CongestionPipeline::new(calibration, config.clone())?);
                }
                Err(e) => {
                    warn!(error = %e, observed = calibrator.observed(), "Auto-calibration failed");
                    continue;
                }
            }
        }
        let Some(pipeline) = pipeline.as_mut() else {
            continue;
        };

        let Some(report) = pipeline.process_frame(&frame) else {
            continue;
        };

        for lane in &report.lanes {
            debug!(
                frame_index = report.frame_index,
                lane = %lane.lane,
                density = %lane.density_level,
                speed = %lane.speed_level,
                state = %lane.congestion_state,
                "Lane result"
            );
        }
        if let Some(sink) = &sink {
            sink.record(REPLAY_SESSION, &report).await?;
        }
    }

    let Some(pipeline) = pipeline else {
        anyhow::bail!(
            "auto-calibration did not complete: {} positions observed over {} frames",
            calibrator.observed(),
            frames_read
        );
    };

    info!(
        frames_read,
        frames_processed = pipeline.frames_processed(),
        "Replay finished"
    );

    let calibration: Vec<_> = pipeline
        .lanes()
        .iter()
        .map(|lane| json!({ "lane": lane.id, "polygon": lane.polygon.vertices() }))
        .collect();
    let summary = json!({
        "frames_read": frames_read,
        "frames_processed": pipeline.frames_processed(),
        "calibration": calibration,
        "lanes": pipeline.lane_states(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

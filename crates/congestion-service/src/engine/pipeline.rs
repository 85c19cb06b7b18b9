/// Per-frame driver tying lane assignment, estimators and per-lane congestion windows together
use super::calibration::LaneCalibration;
use super::config::CongestionConfig;
use super::congestion_state::CongestionDetector;
use super::density::DensityEstimator;
use super::error::EngineResult;
use super::geometry::{first_containing, LanePolygon};
use super::speed::SpeedEstimator;
use super::track_history::TrackHistoryStore;
use common::traffic::{FrameReport, LaneResult, LaneStatus, TrackedFrame, TrackedObject};
use tracing::debug;

/// Runtime state of one calibrated lane
#[derive(Debug, Clone)]
pub struct LaneState {
    pub id: String,
    pub polygon: LanePolygon,
    pub detector: CongestionDetector,
}

#[derive(Debug, Clone)]
pub struct CongestionPipeline {
    lanes: Vec<LaneState>,
    config: CongestionConfig,
    density: DensityEstimator,
    speed: SpeedEstimator,
    history: TrackHistoryStore,
    /// Processed-frame counter driving history staleness
    seq: u64,
    last_processed_frame: Option<u64>,
}

impl CongestionPipeline {
    /// Build the per-lane state; `config` is validated first
    pub fn new(calibration: LaneCalibration, config: CongestionConfig) -> EngineResult<Self> {
        let config = config.validate()?;
        let lanes = calibration
            .into_lanes()
            .into_iter()
            .map(|lane| LaneState {
                id: lane.id,
                polygon: lane.polygon,
                detector: CongestionDetector::new(config.window_size),
            })
            .collect();

        Ok(Self {
            lanes,
            density: DensityEstimator::from_config(&config),
            speed: SpeedEstimator::from_config(&config),
            history: TrackHistoryStore::new(config.history_capacity, config.stale_after_frames),
            config,
            seq: 0,
            last_processed_frame: None,
        })
    }

    /// Whether `frame_index` falls on the processing stride
    pub fn should_process(&self, frame_index: u64) -> bool {
        frame_index % self.config.frame_stride == 0
    }

    /// Run one frame through the pipeline.
    ///
    /// Returns `None` for frames skipped by the stride; such frames leave all state untouched.
    pub fn process_frame(&mut self, frame: &TrackedFrame) -> Option<FrameReport> {
        if !self.should_process(frame.frame_index) {
            return None;
        }

        let seq = self.seq;
        self.seq += 1;
        self.history.record_frame(seq, &frame.objects);

        let mut partition: Vec<Vec<&TrackedObject>> = vec![Vec::new(); self.lanes.len()];
        let mut unassigned = 0;
        for obj in &frame.objects {
            match first_containing(obj.centroid(), self.lanes.iter().map(|l| &l.polygon)) {
                Some(idx) => partition[idx].push(obj),
                None => unassigned += 1,
            }
        }

        let effective_fps = self.config.effective_fps();
        let mut lanes = Vec::with_capacity(self.lanes.len());
        for (lane, objects) in self.lanes.iter_mut().zip(&partition) {
            let density = self
                .density
                .compute(objects.iter().copied(), self.config.road_capacity);

            let histories = unique_ids(objects)
                .into_iter()
                .filter_map(|id| self.history.get(id));
            let speed = self.speed.compute(histories, effective_fps);

            lane.detector.update(density.level, speed.level);
            let congestion_state = lane.detector.state();

            debug!(
                lane = %lane.id,
                vehicles = objects.len(),
                ratio = density.ratio,
                avg_speed = speed.avg_speed,
                state = %congestion_state,
                "Lane updated"
            );

            lanes.push(LaneResult {
                lane: lane.id.clone(),
                vehicle_count: objects.len(),
                occupancy_weight: density.occupancy_weight,
                density_ratio: density.ratio,
                density_level: density.level,
                avg_speed: speed.avg_speed,
                speed_level: speed.level,
                congestion_state,
            });
        }

        let evicted = self.history.evict_stale(seq);
        if evicted > 0 {
            debug!(evicted, frame_index = frame.frame_index, "Evicted stale tracks");
        }
        self.last_processed_frame = Some(frame.frame_index);

        Some(FrameReport {
            frame_index: frame.frame_index,
            timestamp_ms: frame.timestamp_ms,
            lanes,
            unassigned,
        })
    }

    /// Current smoothed state of every lane, in priority order
    pub fn lane_states(&self) -> Vec<LaneStatus> {
        self.lanes
            .iter()
            .map(|lane| LaneStatus {
                lane: lane.id.clone(),
                congestion_state: lane.detector.state(),
                window_len: lane.detector.window_len(),
            })
            .collect()
    }

    /// Clear track history and congestion windows; calibration and config are kept
    pub fn reset(&mut self) {
        self.history.clear();
        for lane in &mut self.lanes {
            lane.detector.reset();
        }
        self.seq = 0;
        self.last_processed_frame = None;
    }

    pub fn lanes(&self) -> &[LaneState] {
        &self.lanes
    }

    pub fn lane_ids(&self) -> Vec<String> {
        self.lanes.iter().map(|l| l.id.clone()).collect()
    }

    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    pub fn tracked_ids(&self) -> usize {
        self.history.len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.seq
    }

    pub fn last_processed_frame(&self) -> Option<u64> {
        self.last_processed_frame
    }
}

/// Track ids in a lane, first occurrence only; the tracker may repeat an id within a frame
fn unique_ids(objects: &[&TrackedObject]) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::with_capacity(objects.len());
    for obj in objects {
        if !ids.contains(&obj.id) {
            ids.push(obj.id);
        }
    }
    ids
}

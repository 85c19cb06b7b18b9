//! Two-lane calibration inferred from where vehicles are observed.
//!
//! The road ROI is the bounding box of observed centroids grown by a margin; the lane divider
//! is the emptiest column of a histogram of centroid x positions.
use super::calibration::{LaneCalibration, LaneDefinition};
use super::error::{EngineError, EngineResult};
use super::geometry::{trapezoid_lanes, RoadRoi};
use common::traffic::{Point, TrackedObject};

/// More positions than this are needed before calibrating
pub const MIN_CALIBRATION_POINTS: usize = 80;

/// Margin added around the observed extent, in pixels
pub const ROI_MARGIN: f64 = 40.0;

/// Bins of the x histogram used to place the lane divider
pub const DIVIDER_BINS: usize = 50;

/// Bounding box of `points` grown by `margin`; the top-left corner is clamped at 0
pub fn estimate_road_roi(points: &[Point], margin: f64) -> Option<RoadRoi> {
    let first = points.first()?;
    let (mut min, mut max) = (*first, *first);
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }

    Some(RoadRoi::new(
        (min.x - margin).max(0.0),
        (min.y - margin).max(0.0),
        max.x + margin,
        max.y + margin,
    ))
}

/// Midpoint of the least populated x-histogram bin, truncated to a whole pixel.
///
/// Bins span the observed x range; the first bin wins a tie. A zero-width range is widened
/// to one pixel around the single value.
pub fn estimate_lane_divider(points: &[Point]) -> Option<f64> {
    let first = points.first()?;
    let (mut lo, mut hi) = (first.x, first.x);
    for p in &points[1..] {
        lo = lo.min(p.x);
        hi = hi.max(p.x);
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / DIVIDER_BINS as f64;
    let mut counts = [0usize; DIVIDER_BINS];
    for p in points {
        let bin = (((p.x - lo) / width) as usize).min(DIVIDER_BINS - 1);
        counts[bin] += 1;
    }

    let (bin, _) = counts.iter().enumerate().min_by_key(|(_, count)| **count)?;
    Some((lo + width * (bin as f64 + 0.5)).trunc())
}

/// Accumulates vehicle centroids until there are enough to place two lanes
#[derive(Debug, Clone)]
pub struct AutoCalibrator {
    points: Vec<Point>,
    min_points: usize,
}

impl AutoCalibrator {
    pub fn new(min_points: usize) -> Self {
        Self {
            points: Vec::new(),
            min_points,
        }
    }

    pub fn observe<'a, I>(&mut self, objects: I)
    where
        I: IntoIterator<Item = &'a TrackedObject>,
    {
        self.points.extend(objects.into_iter().map(TrackedObject::centroid));
    }

    pub fn observed(&self) -> usize {
        self.points.len()
    }

    pub fn is_ready(&self) -> bool {
        self.points.len() > self.min_points
    }

    pub fn road_roi(&self) -> Option<RoadRoi> {
        estimate_road_roi(&self.points, ROI_MARGIN)
    }

    /// Build `lane_1` and `lane_2` trapezoids split at the estimated divider
    pub fn calibrate(&self) -> EngineResult<LaneCalibration> {
        let insufficient = || EngineError::InsufficientObservations {
            found: self.points.len(),
            required: self.min_points,
        };
        if !self.is_ready() {
            return Err(insufficient());
        }

        let roi = self.road_roi().ok_or_else(insufficient)?;
        let divider_x = estimate_lane_divider(&self.points).ok_or_else(insufficient)?;
        let (lane1, lane2) = trapezoid_lanes(roi, divider_x);

        LaneCalibration::new(
            vec![
                LaneDefinition {
                    id: "lane_1".to_string(),
                    polygon: lane1,
                },
                LaneDefinition {
                    id: "lane_2".to_string(),
                    polygon: lane2,
                },
            ],
            None,
        )
    }
}

impl Default for AutoCalibrator {
    fn default() -> Self {
        Self::new(MIN_CALIBRATION_POINTS)
    }
}

//! Traffic congestion contracts shared by the congestion service, its clients and sinks.
//!
//! This module defines the per-frame input from the external tracker, the discrete
//! density/speed/congestion levels, the per-lane result records and the session API payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A point in image-pixel coordinates, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn centroid(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// True when the corners are ordered (x1 < x2, y1 < y2) and finite
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One detection-with-identity for the current frame, as produced by the external tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Stable track identifier assigned by the tracker
    pub id: u64,

    /// Bounding box in image-pixel coordinates
    pub bbox: BoundingBox,

    /// Category label (e.g. "car", "truck"); matched case-insensitively
    #[serde(alias = "cls", alias = "cls_name")]
    pub class_label: String,
}

impl TrackedObject {
    pub fn new(id: u64, bbox: BoundingBox, class_label: impl Into<String>) -> Self {
        Self {
            id,
            bbox,
            class_label: class_label.into(),
        }
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }
}

/// All tracked objects observed in a single frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedFrame {
    /// Frame index in the source stream (0-based)
    pub frame_index: u64,

    /// Capture timestamp (Unix timestamp in milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,

    /// Tracked objects visible in the frame
    #[serde(default)]
    pub objects: Vec<TrackedObject>,
}

/// Error returned when parsing an unknown level or state label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown label '{}'", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

/// Discrete lane density level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DensityLevel {
    Low,
    Medium,
    High,
}

impl DensityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for DensityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DensityLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Discrete lane speed level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeedLevel {
    High,
    Medium,
    Low,
}

impl SpeedLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Temporally smoothed congestion state of a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionState {
    /// No observations yet
    Unknown,
    FreeFlow,
    Normal,
    ModerateCongestion,
    HighCongestion,
    SevereCongestion,
}

impl CongestionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::FreeFlow => "FREE_FLOW",
            Self::Normal => "NORMAL",
            Self::ModerateCongestion => "MODERATE_CONGESTION",
            Self::HighCongestion => "HIGH_CONGESTION",
            Self::SevereCongestion => "SEVERE_CONGESTION",
        }
    }
}

impl fmt::Display for CongestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of recent vehicle counts in a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Per-lane, per-frame result emitted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneResult {
    /// Lane identifier from the calibration (e.g. "lane_1")
    pub lane: String,

    /// Number of tracked objects assigned to the lane this frame
    pub vehicle_count: usize,

    /// Class-weighted occupancy
    pub occupancy_weight: f64,

    /// Occupancy divided by road capacity
    pub density_ratio: f64,

    pub density_level: DensityLevel,

    /// Average displacement-derived speed (pixels per second)
    pub avg_speed: f64,

    pub speed_level: SpeedLevel,

    /// Smoothed state after this frame's update
    pub congestion_state: CongestionState,
}

/// All lane results for one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,

    /// Lane results in lane priority order
    pub lanes: Vec<LaneResult>,

    /// Objects whose centroid fell in no lane
    pub unassigned: usize,
}

impl FrameReport {
    pub fn lane(&self, lane: &str) -> Option<&LaneResult> {
        self.lanes.iter().find(|l| l.lane == lane)
    }
}

/// Request to start a congestion session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartRequest {
    /// Unique session identifier (e.g. a camera id)
    pub id: String,

    /// Lane polygon document (`lane_1`, `lane_2`, optional `frame_width`/`frame_height`)
    pub calibration: serde_json::Value,

    /// Engine tunables; defaults apply to omitted fields
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Response to a session start request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartResponse {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to a session stop request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStopResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,

    /// Lane identifiers in priority order
    pub lanes: Vec<String>,

    /// Timestamp when the session started (Unix timestamp in milliseconds)
    pub started_at: u64,

    /// Timestamp of the last processed frame (Unix timestamp in milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_frame: Option<u64>,

    /// Frames submitted, including skipped ones
    pub frames_received: u64,

    /// Frames that went through lane analysis
    pub frames_processed: u64,

    /// Track ids currently held in the history store
    pub tracked_ids: usize,
}

/// Response to a frame submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSubmitResponse {
    /// False when the frame was skipped by the frame stride
    pub processed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FrameReport>,
}

/// Current smoothed state of one lane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneStatus {
    pub lane: String,
    pub congestion_state: CongestionState,

    /// Number of frames currently held in the smoothing window
    pub window_len: usize,
}

/// Current states of all lanes of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneStatusResponse {
    pub session_id: String,
    pub lanes: Vec<LaneStatus>,
}

/// Trend of one lane derived from recent result records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneTrendResponse {
    pub session_id: String,
    pub lane: String,
    pub trend: CongestionTrend,

    /// Number of records the trend was computed from
    pub samples: usize,
}

/// How a vehicle-count forecast was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Too little history; a fixed default count is returned
    Default,
    /// Mean of the available history
    Mean,
    /// Least-squares line through the history, extrapolated
    Linear,
}

/// Forecast vehicle count of one lane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneForecastResponse {
    pub session_id: String,
    pub lane: String,
    pub minutes_ahead: f64,
    pub predicted_vehicle_count: u64,
    pub method: ForecastMethod,
    pub samples: usize,
}

/// Busiest hour of one lane, by mean vehicle count per record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanePeakHoursResponse {
    pub session_id: String,
    pub lane: String,

    /// UTC hour of day (0-23) with the highest mean vehicle count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_hour: Option<u8>,

    /// Mean of the hourly means
    pub average_vehicle_count: f64,

    /// Mean vehicle count per UTC hour of day
    pub hourly: BTreeMap<u8, f64>,

    /// Number of timestamped records analysed
    pub samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_object_json_shape() {
        let json = r#"{"id": 7, "bbox": [100, 200, 120, 230], "cls": "Car"}"#;
        let obj: TrackedObject = serde_json::from_str(json).unwrap();

        assert_eq!(obj.id, 7);
        assert_eq!(obj.class_label, "Car");
        assert_eq!(obj.centroid(), Point::new(110.0, 215.0));

        let back = serde_json::to_value(&obj).unwrap();
        assert_eq!(back["bbox"], serde_json::json!([100.0, 200.0, 120.0, 230.0]));
        assert_eq!(back["class_label"], "Car");
    }

    #[test]
    fn test_level_labels() {
        assert_eq!("MEDIUM".parse::<DensityLevel>(), Ok(DensityLevel::Medium));
        assert_eq!("LOW".parse::<SpeedLevel>(), Ok(SpeedLevel::Low));
        assert!("medium".parse::<DensityLevel>().is_err());
        assert!("FAST".parse::<SpeedLevel>().is_err());

        let state = serde_json::to_value(CongestionState::SevereCongestion).unwrap();
        assert_eq!(state, "SEVERE_CONGESTION");
        assert_eq!(CongestionState::FreeFlow.to_string(), "FREE_FLOW");
    }

    #[test]
    fn test_bbox_well_formed() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0).is_well_formed());
        assert!(!BoundingBox::new(10.0, 0.0, 10.0, 10.0).is_well_formed());
        assert!(!BoundingBox::new(0.0, 0.0, f64::NAN, 10.0).is_well_formed());
    }

    #[test]
    fn test_frame_defaults() {
        let frame: TrackedFrame = serde_json::from_str(r#"{"frame_index": 3}"#).unwrap();
        assert_eq!(frame.frame_index, 3);
        assert!(frame.objects.is_empty());
        assert!(frame.timestamp_ms.is_none());
    }
}

pub mod auto_calibration;
pub mod calibration;
pub mod config;
pub mod congestion_state;
pub mod density;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod speed;
pub mod track_history;
pub mod trend;

pub use auto_calibration::AutoCalibrator;
pub use calibration::{CalibrationDocument, LaneCalibration, LaneDefinition};
pub use config::{CongestionConfig, DensityThresholds, SpeedThresholds};
pub use congestion_state::CongestionDetector;
pub use density::{DensityEstimator, DensityResult};
pub use error::{EngineError, EngineResult};
pub use geometry::{is_inside_polygon, trapezoid_lanes, LanePolygon, RoadRoi};
pub use pipeline::CongestionPipeline;
pub use speed::{SpeedEstimator, SpeedResult};
pub use track_history::{TrackHistory, TrackHistoryStore};
pub use trend::{congestion_trend, forecast_vehicle_count, peak_hours};

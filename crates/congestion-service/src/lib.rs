pub mod api;
pub mod config;
pub mod engine;
pub mod sink;
pub mod source;
pub mod state;

pub use config::{CongestionServiceConfig, SinkKind};
pub use engine::{CongestionConfig, CongestionPipeline, LaneCalibration};
pub use state::{CongestionServiceState, SessionError};

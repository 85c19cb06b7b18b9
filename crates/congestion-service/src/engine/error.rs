use thiserror::Error;

/// Configuration and calibration errors raised before any frame is processed
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("lane '{lane}' has {found} vertices, expected {expected}")]
    InvalidVertexCount {
        lane: String,
        expected: usize,
        found: usize,
    },

    #[error("lane '{lane}' polygon is self-intersecting")]
    SelfIntersecting { lane: String },

    #[error("lane '{lane}' polygon has zero area")]
    DegeneratePolygon { lane: String },

    #[error("lane '{lane}' vertex ({x}, {y}) lies outside the {width}x{height} frame")]
    VertexOutOfBounds {
        lane: String,
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },

    #[error("calibration key '{0}' is not a lane key (expected lane_<n>)")]
    InvalidLaneKey(String),

    #[error("calibration defines no lanes")]
    NoLanes,

    #[error("auto-calibration needs more than {required} vehicle positions, observed {found}")]
    InsufficientObservations { found: usize, required: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

use super::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine tunables for one session.
///
/// Every field has a default, so `{}` or `null` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionConfig {
    /// Occupancy weight that corresponds to a full lane (density ratio 1.0)
    #[serde(default = "default_road_capacity")]
    pub road_capacity: f64,

    /// Number of frames in the congestion smoothing window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Process every Nth frame (1 = every frame)
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u64,

    /// Capture rate of the source stream
    #[serde(default = "default_nominal_fps")]
    pub nominal_fps: f64,

    /// Occupancy weight per vehicle class (lower-case keys)
    #[serde(default = "default_class_weights")]
    pub class_weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub density_thresholds: DensityThresholds,

    #[serde(default)]
    pub speed_thresholds: SpeedThresholds,

    /// Positions retained per track (at least 2 are needed for speed)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Processed frames after which an unseen track id is dropped
    #[serde(default = "default_stale_after_frames")]
    pub stale_after_frames: u64,
}

/// Density ratio boundaries; each lower bound is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for DensityThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.7,
        }
    }
}

/// Average speed boundaries in pixels per second; each lower bound is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for SpeedThresholds {
    fn default() -> Self {
        Self {
            medium: 10.0,
            high: 20.0,
        }
    }
}

fn default_road_capacity() -> f64 {
    60.0
}

/// Congestion smoothing window used when a session does not set one
pub const DEFAULT_WINDOW_SIZE: usize = 15;

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_frame_stride() -> u64 {
    1
}

fn default_nominal_fps() -> f64 {
    30.0
}

fn default_history_capacity() -> usize {
    5
}

fn default_stale_after_frames() -> u64 {
    30
}

pub fn default_class_weights() -> BTreeMap<String, f64> {
    [
        ("car", 1.0),
        ("truck", 2.0),
        ("bus", 3.0),
        ("motorbike", 0.5),
        ("bicycle", 0.5),
    ]
    .into_iter()
    .map(|(class, weight)| (class.to_string(), weight))
    .collect()
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            road_capacity: default_road_capacity(),
            window_size: default_window_size(),
            frame_stride: default_frame_stride(),
            nominal_fps: default_nominal_fps(),
            class_weights: default_class_weights(),
            density_thresholds: DensityThresholds::default(),
            speed_thresholds: SpeedThresholds::default(),
            history_capacity: default_history_capacity(),
            stale_after_frames: default_stale_after_frames(),
        }
    }
}

impl CongestionConfig {
    /// Parse tunables from JSON; `null` yields the defaults
    pub fn from_json_value(value: serde_json::Value) -> EngineResult<Self> {
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value).map_err(|e| EngineError::InvalidConfig(e.to_string()))?
        };
        config.validate()
    }

    /// Check ranges and normalise class keys to lower case.
    ///
    /// A non-positive road capacity is accepted; density ratios then degrade to 0.
    pub fn validate(mut self) -> EngineResult<Self> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !self.road_capacity.is_finite() {
            return invalid(format!("road_capacity must be finite (got {})", self.road_capacity));
        }
        if self.window_size == 0 {
            return invalid("window_size must be at least 1".to_string());
        }
        if self.frame_stride == 0 {
            return invalid("frame_stride must be at least 1".to_string());
        }
        if !(self.nominal_fps.is_finite() && self.nominal_fps > 0.0) {
            return invalid(format!("nominal_fps must be positive (got {})", self.nominal_fps));
        }
        if self.history_capacity < 2 {
            return invalid(format!(
                "history_capacity must be at least 2 (got {})",
                self.history_capacity
            ));
        }
        if self.stale_after_frames == 0 {
            return invalid("stale_after_frames must be at least 1".to_string());
        }
        if let Some((class, weight)) = self
            .class_weights
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return invalid(format!("weight for class '{}' must be >= 0 (got {})", class, weight));
        }
        if self.density_thresholds.medium >= self.density_thresholds.high {
            return invalid("density_thresholds.medium must be below density_thresholds.high".to_string());
        }
        if self.speed_thresholds.medium >= self.speed_thresholds.high {
            return invalid("speed_thresholds.medium must be below speed_thresholds.high".to_string());
        }

        self.class_weights = self
            .class_weights
            .into_iter()
            .map(|(class, weight)| (class.to_lowercase(), weight))
            .collect();
        Ok(self)
    }

    /// Frame rate seen by the speed estimator once frame skipping is applied
    pub fn effective_fps(&self) -> f64 {
        self.nominal_fps / self.frame_stride as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = CongestionConfig::default();
        assert_eq!(config.road_capacity, 60.0);
        assert_eq!(config.window_size, 15);
        assert_eq!(config.frame_stride, 1);
        assert_eq!(config.class_weights["car"], 1.0);
        assert_eq!(config.class_weights["bus"], 3.0);
        assert_eq!(config.density_thresholds.medium, 0.4);
        assert_eq!(config.speed_thresholds.high, 20.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CongestionConfig::from_json_value(json!({
            "road_capacity": 30,
            "frame_stride": 3,
            "nominal_fps": 30
        }))
        .unwrap();
        assert_eq!(config.road_capacity, 30.0);
        assert_eq!(config.window_size, 15);
        assert_eq!(config.effective_fps(), 10.0);

        let config = CongestionConfig::from_json_value(serde_json::Value::Null).unwrap();
        assert_eq!(config, CongestionConfig::default());
    }

    #[test]
    fn test_class_keys_lowercased() {
        let config = CongestionConfig::from_json_value(json!({
            "class_weights": {"Car": 1.0, "TRUCK": 2.5}
        }))
        .unwrap();
        assert_eq!(config.class_weights.get("truck"), Some(&2.5));
        assert!(config.class_weights.get("Car").is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        for bad in [
            json!({"window_size": 0}),
            json!({"frame_stride": 0}),
            json!({"nominal_fps": 0}),
            json!({"history_capacity": 1}),
            json!({"class_weights": {"car": -1.0}}),
            json!({"density_thresholds": {"medium": 0.8, "high": 0.7}}),
            json!({"window_size": "fifteen"}),
        ] {
            assert!(
                matches!(
                    CongestionConfig::from_json_value(bad.clone()),
                    Err(EngineError::InvalidConfig(_))
                ),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_non_positive_capacity_allowed() {
        let config = CongestionConfig::from_json_value(json!({"road_capacity": 0})).unwrap();
        assert_eq!(config.road_capacity, 0.0);
    }
}

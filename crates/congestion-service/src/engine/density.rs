/// Lane density estimation: class-weighted occupancy normalised by road capacity
use super::config::{CongestionConfig, DensityThresholds};
use common::traffic::{DensityLevel, TrackedObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityResult {
    pub occupancy_weight: f64,
    pub ratio: f64,
    pub level: DensityLevel,
}

/// Pure density estimator built from immutable configuration
#[derive(Debug, Clone)]
pub struct DensityEstimator {
    weights: BTreeMap<String, f64>,
    thresholds: DensityThresholds,
}

impl DensityEstimator {
    /// `weights` keys must be lower case; [`CongestionConfig::validate`] guarantees that
    pub fn new(weights: BTreeMap<String, f64>, thresholds: DensityThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn from_config(config: &CongestionConfig) -> Self {
        Self::new(config.class_weights.clone(), config.density_thresholds)
    }

    /// Weight of a class label; unknown classes weigh nothing
    pub fn class_weight(&self, class_label: &str) -> f64 {
        self.weights
            .get(&class_label.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    /// Density of objects already assigned to a lane
    pub fn compute<'a, I>(&self, lane_objects: I, road_capacity: f64) -> DensityResult
    where
        I: IntoIterator<Item = &'a TrackedObject>,
    {
        let occupancy_weight: f64 = lane_objects
            .into_iter()
            .map(|obj| self.class_weight(&obj.class_label))
            .sum();

        let ratio = if road_capacity > 0.0 {
            occupancy_weight / road_capacity
        } else {
            0.0
        };

        DensityResult {
            occupancy_weight,
            ratio,
            level: self.classify(ratio),
        }
    }

    pub fn classify(&self, ratio: f64) -> DensityLevel {
        if ratio < self.thresholds.medium {
            DensityLevel::Low
        } else if ratio < self.thresholds.high {
            DensityLevel::Medium
        } else {
            DensityLevel::High
        }
    }
}

impl Default for DensityEstimator {
    fn default() -> Self {
        Self::from_config(&CongestionConfig::default())
    }
}

/// Lane speed estimation from the most recent displacement of each track
use super::config::{CongestionConfig, SpeedThresholds};
use super::track_history::TrackHistory;
use common::traffic::SpeedLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedResult {
    /// Pixels per second, uncalibrated
    pub avg_speed: f64,
    pub level: SpeedLevel,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedEstimator {
    thresholds: SpeedThresholds,
}

impl SpeedEstimator {
    pub fn new(thresholds: SpeedThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &CongestionConfig) -> Self {
        Self::new(config.speed_thresholds)
    }

    /// Average of `distance(last two positions) * effective_fps` over tracks with at least
    /// two positions. Tracks with fewer positions do not count towards the mean.
    pub fn compute<'a, I>(&self, lane_histories: I, effective_fps: f64) -> SpeedResult
    where
        I: IntoIterator<Item = &'a TrackHistory>,
    {
        let (total, count) = lane_histories
            .into_iter()
            .filter_map(TrackHistory::last_two)
            .map(|(prev, last)| prev.distance_to(&last) * effective_fps)
            .fold((0.0, 0usize), |(sum, n), speed| (sum + speed, n + 1));

        let avg_speed = if count > 0 { total / count as f64 } else { 0.0 };

        SpeedResult {
            avg_speed,
            level: self.classify(avg_speed),
        }
    }

    pub fn classify(&self, avg_speed: f64) -> SpeedLevel {
        if avg_speed < self.thresholds.medium {
            SpeedLevel::Low
        } else if avg_speed < self.thresholds.high {
            SpeedLevel::Medium
        } else {
            SpeedLevel::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::traffic::Point;

    fn history(points: &[(f64, f64)]) -> TrackHistory {
        TrackHistory::from_positions(5, points.iter().map(|&(x, y)| Point::new(x, y)))
    }

    #[test]
    fn test_threshold_boundaries() {
        let estimator = SpeedEstimator::default();
        assert_eq!(estimator.classify(0.0), SpeedLevel::Low);
        assert_eq!(estimator.classify(9.999), SpeedLevel::Low);
        assert_eq!(estimator.classify(10.0), SpeedLevel::Medium);
        assert_eq!(estimator.classify(19.999), SpeedLevel::Medium);
        assert_eq!(estimator.classify(20.0), SpeedLevel::High);
    }

    #[test]
    fn test_uses_only_last_displacement() {
        let estimator = SpeedEstimator::default();
        // 100px jump early on, then 3-4-5 triangle
        let h = history(&[(0.0, 0.0), (100.0, 0.0), (103.0, 4.0)]);

        let result = estimator.compute([&h], 10.0);
        assert_eq!(result.avg_speed, 50.0);
        assert_eq!(result.level, SpeedLevel::High);
    }

    #[test]
    fn test_short_histories_excluded_from_mean() {
        let estimator = SpeedEstimator::default();
        let moving = history(&[(0.0, 0.0), (1.0, 0.0)]);
        let fresh = history(&[(50.0, 50.0)]);

        let result = estimator.compute([&moving, &fresh], 12.0);
        assert_eq!(result.avg_speed, 12.0);
        assert_eq!(result.level, SpeedLevel::Medium);
    }

    #[test]
    fn test_no_qualifying_tracks() {
        let estimator = SpeedEstimator::default();
        let fresh = history(&[(50.0, 50.0)]);

        let result = estimator.compute([&fresh], 30.0);
        assert_eq!(result.avg_speed, 0.0);
        assert_eq!(result.level, SpeedLevel::Low);

        let result = estimator.compute(std::iter::empty(), 30.0);
        assert_eq!(result.avg_speed, 0.0);
        assert_eq!(result.level, SpeedLevel::Low);
    }

    #[test]
    fn test_effective_fps_scaling() {
        let estimator = SpeedEstimator::default();
        // 6px between processed frames, stride 3 at 30fps
        let h = history(&[(0.0, 0.0), (6.0, 0.0)]);

        let result = estimator.compute([&h], 30.0 / 3.0);
        assert_eq!(result.avg_speed, 60.0);
    }
}

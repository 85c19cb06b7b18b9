/// Per-lane congestion classifier with temporal smoothing.
///
/// Each frame contributes one density code and one speed code to fixed-size windows. The
/// state is derived from the window means on every query; it is never cached.
use super::config::DEFAULT_WINDOW_SIZE;
use common::traffic::{CongestionState, DensityLevel, SpeedLevel};
use std::collections::VecDeque;

/// LOW=0, MEDIUM=1, HIGH=2
pub fn density_code(level: DensityLevel) -> u8 {
    match level {
        DensityLevel::Low => 0,
        DensityLevel::Medium => 1,
        DensityLevel::High => 2,
    }
}

/// Inverted so that a higher code always means more congested: HIGH=0, MEDIUM=1, LOW=2
pub fn speed_code(level: SpeedLevel) -> u8 {
    match level {
        SpeedLevel::High => 0,
        SpeedLevel::Medium => 1,
        SpeedLevel::Low => 2,
    }
}

/// Map window means to a state. Rules are evaluated in order, first match wins.
pub fn classify(avg_density: f64, avg_speed: f64) -> CongestionState {
    if avg_density >= 1.6 && avg_speed >= 1.6 {
        CongestionState::SevereCongestion
    } else if avg_density >= 1.0 && avg_speed >= 1.2 {
        CongestionState::HighCongestion
    } else if avg_density >= 1.5 && avg_speed < 1.2 {
        CongestionState::ModerateCongestion
    } else if avg_density < 0.5 {
        CongestionState::FreeFlow
    } else {
        CongestionState::Normal
    }
}

#[derive(Debug, Clone)]
pub struct CongestionDetector {
    window_size: usize,
    density_hist: VecDeque<u8>,
    speed_hist: VecDeque<u8>,
}

impl CongestionDetector {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            density_hist: VecDeque::with_capacity(window_size),
            speed_hist: VecDeque::with_capacity(window_size),
        }
    }

    pub fn update(&mut self, density: DensityLevel, speed: SpeedLevel) {
        push_bounded(&mut self.density_hist, density_code(density), self.window_size);
        push_bounded(&mut self.speed_hist, speed_code(speed), self.window_size);
    }

    /// Update from textual labels ("LOW", "MEDIUM", "HIGH").
    ///
    /// Unknown labels leave the window untouched. Returns whether the update was applied.
    pub fn update_labels(&mut self, density: &str, speed: &str) -> bool {
        match (density.parse::<DensityLevel>(), speed.parse::<SpeedLevel>()) {
            (Ok(d), Ok(s)) => {
                self.update(d, s);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> CongestionState {
        match (mean(&self.density_hist), mean(&self.speed_hist)) {
            (Some(avg_density), Some(avg_speed)) => classify(avg_density, avg_speed),
            _ => CongestionState::Unknown,
        }
    }

    /// Current window means as (density, speed)
    pub fn averages(&self) -> Option<(f64, f64)> {
        Some((mean(&self.density_hist)?, mean(&self.speed_hist)?))
    }

    pub fn window_len(&self) -> usize {
        self.density_hist.len().min(self.speed_hist.len())
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn reset(&mut self) {
        self.density_hist.clear();
        self.speed_hist.clear();
    }
}

impl Default for CongestionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

fn push_bounded(buf: &mut VecDeque<u8>, code: u8, capacity: usize) {
    if buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(code);
}

fn mean(buf: &VecDeque<u8>) -> Option<f64> {
    if buf.is_empty() {
        return None;
    }
    let sum: u32 = buf.iter().map(|&c| u32::from(c)).sum();
    Some(f64::from(sum) / buf.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use DensityLevel as D;
    use SpeedLevel as S;

    fn fill(detector: &mut CongestionDetector, n: usize, d: DensityLevel, s: SpeedLevel) {
        for _ in 0..n {
            detector.update(d, s);
        }
    }

    #[test]
    fn test_empty_window_is_unknown() {
        let detector = CongestionDetector::default();
        assert_eq!(detector.state(), CongestionState::Unknown);
        assert_eq!(detector.averages(), None);
    }

    #[test]
    fn test_default_window_matches_config() {
        let config = crate::engine::CongestionConfig::default();
        assert_eq!(CongestionDetector::default().window_size(), config.window_size);
    }

    #[test]
    fn test_rule_precedence() {
        assert_eq!(classify(1.6, 1.6), CongestionState::SevereCongestion);
        assert_eq!(classify(1.0, 1.2), CongestionState::HighCongestion);
        assert_eq!(classify(1.7, 1.3), CongestionState::HighCongestion);
        assert_eq!(classify(1.5, 1.19), CongestionState::ModerateCongestion);
        assert_eq!(classify(2.0, 0.0), CongestionState::ModerateCongestion);
        assert_eq!(classify(0.49, 2.0), CongestionState::FreeFlow);
        assert_eq!(classify(0.5, 0.0), CongestionState::Normal);
        assert_eq!(classify(1.4, 1.1), CongestionState::Normal);
        assert_eq!(classify(0.99, 2.0), CongestionState::Normal);
    }

    #[test]
    fn test_window_eviction_keeps_latest() {
        let mut detector = CongestionDetector::new(15);
        fill(&mut detector, 15, D::Low, S::High);
        assert_eq!(detector.state(), CongestionState::FreeFlow);

        fill(&mut detector, 15 + 3, D::High, S::Low);
        assert_eq!(detector.window_len(), 15);
        assert_eq!(detector.averages(), Some((2.0, 2.0)));
        assert_eq!(detector.state(), CongestionState::SevereCongestion);
    }

    #[test]
    fn test_boundary_means_from_window() {
        // 9 HIGH + 6 MEDIUM density = 24/15 = 1.6; same for speed codes
        let mut detector = CongestionDetector::new(15);
        fill(&mut detector, 9, D::High, S::Low);
        fill(&mut detector, 6, D::Medium, S::Medium);
        assert_eq!(detector.averages(), Some((1.6, 1.6)));
        assert_eq!(detector.state(), CongestionState::SevereCongestion);

        // 1 frame evicted in favour of MEDIUM/MEDIUM: 23/15 < 1.6 → rule 2
        detector.update(D::Medium, S::Medium);
        assert_eq!(detector.state(), CongestionState::HighCongestion);
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let mut detector = CongestionDetector::new(5);
        assert!(!detector.update_labels("VERY_HIGH", "LOW"));
        assert!(!detector.update_labels("HIGH", "STOPPED"));
        assert_eq!(detector.window_len(), 0);
        assert_eq!(detector.state(), CongestionState::Unknown);

        assert!(detector.update_labels("HIGH", "LOW"));
        assert_eq!(detector.window_len(), 1);
        assert_eq!(detector.state(), CongestionState::SevereCongestion);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut detector = CongestionDetector::new(3);
        fill(&mut detector, 3, D::Medium, S::Medium);
        assert_eq!(detector.state(), CongestionState::Normal);

        detector.reset();
        assert_eq!(detector.state(), CongestionState::Unknown);
        assert_eq!(detector.window_size(), 3);
    }
}

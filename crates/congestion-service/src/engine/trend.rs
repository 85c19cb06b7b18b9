//! Short-horizon analysis of a lane's recorded results: trend direction, vehicle-count
//! forecast and busiest hour of day.
use common::traffic::{CongestionTrend, ForecastMethod, LaneResult};
use std::collections::BTreeMap;

/// Number of recent records considered
pub const TREND_WINDOW: usize = 10;

/// Fewer records than this always read as stable
pub const TREND_MIN_SAMPLES: usize = 5;

/// Difference in mean vehicle count that counts as a change
pub const TREND_DELTA: f64 = 5.0;

/// Direction of a lane's vehicle count over its recent records, oldest first.
///
/// The last [`TREND_WINDOW`] records are split into an older and a newer half and the
/// mean vehicle count of each half is compared.
pub fn congestion_trend(records: &[LaneResult]) -> CongestionTrend {
    let recent = &records[records.len().saturating_sub(TREND_WINDOW)..];
    if recent.len() < TREND_MIN_SAMPLES {
        return CongestionTrend::Stable;
    }

    let (older, newer) = recent.split_at(recent.len() / 2);
    let delta = mean_vehicles(newer) - mean_vehicles(older);

    if delta > TREND_DELTA {
        CongestionTrend::Increasing
    } else if delta < -TREND_DELTA {
        CongestionTrend::Decreasing
    } else {
        CongestionTrend::Stable
    }
}

/// Records considered for a forecast
pub const FORECAST_WINDOW: usize = 100;

/// Fewer records than this yield [`DEFAULT_FORECAST`]
pub const FORECAST_MIN_SAMPLES: usize = 5;

/// Fewer records than this yield the plain mean
pub const FORECAST_LINEAR_SAMPLES: usize = 10;

pub const DEFAULT_FORECAST: u64 = 25;

/// Upper clamp of a forecast vehicle count
pub const MAX_FORECAST: f64 = 200.0;

/// Minutes between consecutive records assumed by the extrapolation
pub const FORECAST_STEP_MINUTES: f64 = 5.0;

/// Records considered when looking for the peak hour
pub const PEAK_HOURS_WINDOW: usize = 500;

const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub vehicle_count: u64,
    pub method: ForecastMethod,
}

/// Forecast the vehicle count `minutes_ahead` from now out of records ordered oldest first.
///
/// With at least [`FORECAST_LINEAR_SAMPLES`] records a least-squares line through
/// (index, vehicle count) is evaluated `minutes_ahead / 5` steps past the last index and
/// clamped to `[0, MAX_FORECAST]`.
pub fn forecast_vehicle_count(records: &[LaneResult], minutes_ahead: f64) -> Forecast {
    let recent = &records[records.len().saturating_sub(FORECAST_WINDOW)..];
    if recent.len() < FORECAST_MIN_SAMPLES {
        return Forecast {
            vehicle_count: DEFAULT_FORECAST,
            method: ForecastMethod::Default,
        };
    }

    let mean_count = mean_vehicles(recent);
    if recent.len() < FORECAST_LINEAR_SAMPLES {
        return Forecast {
            vehicle_count: mean_count as u64,
            method: ForecastMethod::Mean,
        };
    }

    let n = recent.len() as f64;
    let mean_index = (n - 1.0) / 2.0;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, record) in recent.iter().enumerate() {
        let dx = i as f64 - mean_index;
        sxy += dx * (record.vehicle_count as f64 - mean_count);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;

    let target = n + minutes_ahead / FORECAST_STEP_MINUTES;
    let predicted = mean_count + slope * (target - mean_index);

    Forecast {
        vehicle_count: predicted.clamp(0.0, MAX_FORECAST) as u64,
        method: ForecastMethod::Linear,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakHours {
    /// UTC hour with the highest mean vehicle count; earliest hour wins a tie
    pub peak_hour: Option<u8>,
    pub average_vehicle_count: f64,
    pub hourly: BTreeMap<u8, f64>,
    pub samples: usize,
}

/// Group `(timestamp_ms, vehicle_count)` samples by UTC hour of day
pub fn peak_hours<I>(samples: I) -> PeakHours
where
    I: IntoIterator<Item = (u64, usize)>,
{
    let mut sums: BTreeMap<u8, (f64, usize)> = BTreeMap::new();
    let mut total = 0;
    for (timestamp_ms, vehicle_count) in samples {
        let hour = ((timestamp_ms / MS_PER_HOUR) % 24) as u8;
        let entry = sums.entry(hour).or_insert((0.0, 0));
        entry.0 += vehicle_count as f64;
        entry.1 += 1;
        total += 1;
    }

    let hourly: BTreeMap<u8, f64> = sums
        .into_iter()
        .map(|(hour, (sum, count))| (hour, sum / count as f64))
        .collect();

    let mut peak: Option<(u8, f64)> = None;
    for (&hour, &mean) in &hourly {
        if peak.map_or(true, |(_, best)| mean > best) {
            peak = Some((hour, mean));
        }
    }

    let average_vehicle_count = if hourly.is_empty() {
        0.0
    } else {
        hourly.values().sum::<f64>() / hourly.len() as f64
    };

    PeakHours {
        peak_hour: peak.map(|(hour, _)| hour),
        average_vehicle_count,
        hourly,
        samples: total,
    }
}

fn mean_vehicles(records: &[LaneResult]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.vehicle_count as f64).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::traffic::{CongestionState, DensityLevel, SpeedLevel};

    fn records(counts: &[usize]) -> Vec<LaneResult> {
        counts
            .iter()
            .map(|&vehicle_count| LaneResult {
                lane: "lane_1".to_string(),
                vehicle_count,
                occupancy_weight: vehicle_count as f64,
                density_ratio: 0.0,
                density_level: DensityLevel::Low,
                avg_speed: 0.0,
                speed_level: SpeedLevel::Low,
                congestion_state: CongestionState::Normal,
            })
            .collect()
    }

    #[test]
    fn test_too_few_samples_is_stable() {
        assert_eq!(congestion_trend(&records(&[])), CongestionTrend::Stable);
        assert_eq!(congestion_trend(&records(&[0, 0, 40, 40])), CongestionTrend::Stable);
    }

    #[test]
    fn test_increasing_and_decreasing() {
        assert_eq!(
            congestion_trend(&records(&[2, 2, 3, 3, 3, 10, 12, 12, 14, 15])),
            CongestionTrend::Increasing
        );
        assert_eq!(
            congestion_trend(&records(&[20, 20, 18, 15, 5, 4, 3])),
            CongestionTrend::Decreasing
        );
    }

    #[test]
    fn test_small_change_is_stable() {
        assert_eq!(
            congestion_trend(&records(&[10, 10, 10, 10, 10, 15, 15, 15, 15, 15])),
            CongestionTrend::Stable
        );
    }

    #[test]
    fn test_forecast_fallbacks() {
        let forecast = forecast_vehicle_count(&records(&[40, 40, 40, 40]), 15.0);
        assert_eq!(forecast.method, ForecastMethod::Default);
        assert_eq!(forecast.vehicle_count, DEFAULT_FORECAST);

        // mean 3.6 truncates to 3
        let forecast = forecast_vehicle_count(&records(&[1, 2, 3, 4, 8]), 15.0);
        assert_eq!(forecast.method, ForecastMethod::Mean);
        assert_eq!(forecast.vehicle_count, 3);
    }

    #[test]
    fn test_forecast_extrapolates_line() {
        let counts: Vec<usize> = (0..10).collect();
        let forecast = forecast_vehicle_count(&records(&counts), 15.0);
        assert_eq!(forecast.method, ForecastMethod::Linear);
        // 10 records, 15 minutes = 3 steps past index 10
        assert_eq!(forecast.vehicle_count, 13);
    }

    #[test]
    fn test_forecast_is_clamped() {
        let rising: Vec<usize> = (0..10).map(|i| i * 50).collect();
        assert_eq!(forecast_vehicle_count(&records(&rising), 15.0).vehicle_count, 200);

        let falling: Vec<usize> = (0..10).map(|i| 90 - i * 10).collect();
        assert_eq!(forecast_vehicle_count(&records(&falling), 15.0).vehicle_count, 0);
    }

    #[test]
    fn test_peak_hours_groups_by_utc_hour() {
        let eight = 8 * MS_PER_HOUR;
        let five_pm = 17 * MS_PER_HOUR;
        let day = 24 * MS_PER_HOUR;
        let peak = peak_hours([(eight, 10), (eight + 60_000, 20), (day + five_pm, 40)]);

        assert_eq!(peak.peak_hour, Some(17));
        assert_eq!(peak.hourly.get(&8), Some(&15.0));
        assert_eq!(peak.average_vehicle_count, 27.5);
        assert_eq!(peak.samples, 3);
    }

    #[test]
    fn test_peak_hours_empty_and_ties() {
        let peak = peak_hours(Vec::new());
        assert_eq!(peak.peak_hour, None);
        assert_eq!(peak.average_vehicle_count, 0.0);

        let peak = peak_hours([(17 * MS_PER_HOUR, 5), (9 * MS_PER_HOUR, 5)]);
        assert_eq!(peak.peak_hour, Some(9));
    }

    #[test]
    fn test_only_last_window_counts() {
        // An early ramp falls outside the last ten records
        let mut counts = vec![0; 5];
        counts.extend([30; 10]);
        assert_eq!(congestion_trend(&records(&counts)), CongestionTrend::Stable);
    }
}

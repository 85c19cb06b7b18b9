use lazy_static::lazy_static;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Session Metrics ====
    pub static ref CONGESTION_ACTIVE_SESSIONS: IntGauge = {
        let metric = IntGauge::new(
            "congestion_active_sessions",
            "Number of active congestion sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CONGESTION_SESSION_OPERATIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "congestion_session_operations_total",
                "Total number of session operations",
            ),
            &["operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Frame Metrics ====
    pub static ref CONGESTION_FRAMES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "congestion_frames_total",
                "Total number of submitted frames by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CONGESTION_FRAME_PROCESSING_TIME: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "congestion_frame_processing_seconds",
                "Time spent on lane analysis for a single frame",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CONGESTION_TRACKED_IDS: IntGaugeVec = {
        let metric = IntGaugeVec::new(
            Opts::new(
                "congestion_tracked_ids",
                "Track ids held in the history store",
            ),
            &["session"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Lane Metrics ====
    pub static ref CONGESTION_LANE_DENSITY_RATIO: GaugeVec = {
        let metric = GaugeVec::new(
            Opts::new(
                "congestion_lane_density_ratio",
                "Latest occupancy / road capacity ratio per lane",
            ),
            &["session", "lane"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CONGESTION_LANE_AVG_SPEED: GaugeVec = {
        let metric = GaugeVec::new(
            Opts::new(
                "congestion_lane_avg_speed",
                "Latest average speed per lane (pixels per second)",
            ),
            &["session", "lane"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CONGESTION_LANE_STATE: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "congestion_lane_state_total",
                "Number of processed frames per lane and congestion state",
            ),
            &["lane", "state"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Sink Metrics ====
    pub static ref CONGESTION_SINK_WRITES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "congestion_sink_writes_total",
                "Total number of result sink writes",
            ),
            &["sink", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_metrics_accessible() {
        CONGESTION_ACTIVE_SESSIONS.set(2);
        assert_eq!(CONGESTION_ACTIVE_SESSIONS.get(), 2);
    }

    #[test]
    fn test_lane_metrics_accessible() {
        CONGESTION_LANE_DENSITY_RATIO
            .with_label_values(&["cam-1", "lane_1"])
            .set(0.42);
        assert_eq!(
            CONGESTION_LANE_DENSITY_RATIO
                .with_label_values(&["cam-1", "lane_1"])
                .get(),
            0.42
        );

        CONGESTION_LANE_STATE
            .with_label_values(&["lane_metrics_test", "NORMAL"])
            .inc();
        assert_eq!(
            CONGESTION_LANE_STATE
                .with_label_values(&["lane_metrics_test", "NORMAL"])
                .get(),
            1
        );
    }

    #[test]
    fn test_encode_metrics_succeeds() {
        CONGESTION_FRAMES.with_label_values(&["processed"]).inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("congestion_frames_total"));
    }
}

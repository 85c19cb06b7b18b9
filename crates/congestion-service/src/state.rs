use crate::engine::trend::{
    congestion_trend, forecast_vehicle_count, peak_hours, FORECAST_WINDOW, PEAK_HOURS_WINDOW,
    TREND_WINDOW,
};
use crate::engine::{CongestionConfig, CongestionPipeline, LaneCalibration};
use crate::sink::{LaneRecord, ResultSink};
use common::traffic::{
    FrameReport, LaneForecastResponse, LanePeakHoursResponse, LaneResult, LaneStatusResponse,
    LaneTrendResponse, SessionInfo, SessionStartRequest, TrackedFrame,
};
use common::validation::{safe_unix_millis, validate_id, validate_tracked_frame};
use std::collections::HashMap;
use std::sync::Arc;
use telemetry::metrics::{
    CONGESTION_ACTIVE_SESSIONS, CONGESTION_FRAMES, CONGESTION_FRAME_PROCESSING_TIME,
    CONGESTION_LANE_AVG_SPEED, CONGESTION_LANE_DENSITY_RATIO, CONGESTION_LANE_STATE,
    CONGESTION_SESSION_OPERATIONS, CONGESTION_SINK_WRITES, CONGESTION_TRACKED_IDS,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("Session '{0}' already exists")]
    AlreadyExists(String),

    #[error("Lane '{lane}' not found in session '{session}'")]
    LaneNotFound { session: String, lane: String },

    #[error("{0:#}")]
    Invalid(anyhow::Error),

    #[error("Result sink failure: {0:#}")]
    Sink(anyhow::Error),
}

#[derive(Clone)]
pub struct CongestionServiceState {
    inner: Arc<CongestionServiceStateInner>,
}

struct CongestionServiceStateInner {
    node_id: String,
    sink: Arc<dyn ResultSink>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

struct Session {
    id: String,
    lanes: Vec<String>,
    started_at: u64,
    runtime: Mutex<SessionRuntime>,
}

struct SessionRuntime {
    pipeline: CongestionPipeline,
    frames_received: u64,
    last_processed_at: Option<u64>,
    /// Set under the lock by `stop_session`; frames still queued on the lock are refused
    stopped: bool,
}

impl Session {
    async fn info(&self) -> SessionInfo {
        let runtime = self.runtime.lock().await;
        SessionInfo {
            id: self.id.clone(),
            lanes: self.lanes.clone(),
            started_at: self.started_at,
            last_processed_frame: runtime.last_processed_at,
            frames_received: runtime.frames_received,
            frames_processed: runtime.pipeline.frames_processed(),
            tracked_ids: runtime.pipeline.tracked_ids(),
        }
    }
}

impl CongestionServiceState {
    pub fn new(node_id: String, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            inner: Arc::new(CongestionServiceStateInner {
                node_id,
                sink,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.inner.sink
    }

    async fn session(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        let session = self.session(session_id).await.ok()?;
        Some(session.info().await)
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.inner.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Validate the calibration and tunables, then register a new pipeline
    pub async fn start_session(&self, request: SessionStartRequest) -> Result<String, SessionError> {
        let result = self.try_start_session(request).await;
        let status = if result.is_ok() { "success" } else { "error" };
        CONGESTION_SESSION_OPERATIONS
            .with_label_values(&["start", status])
            .inc();
        result
    }

    async fn try_start_session(&self, request: SessionStartRequest) -> Result<String, SessionError> {
        let session_id = request.id;
        validate_id(&session_id, "session id").map_err(SessionError::Invalid)?;

        let calibration =
            LaneCalibration::from_json_value(request.calibration).map_err(SessionError::Invalid)?;
        let config = CongestionConfig::from_json_value(request.config)
            .map_err(|e| SessionError::Invalid(e.into()))?;

        let lanes = calibration.lane_ids();
        let pipeline = CongestionPipeline::new(calibration, config)
            .map_err(|e| SessionError::Invalid(e.into()))?;

        {
            let mut sessions = self.inner.sessions.write().await;
            if sessions.contains_key(&session_id) {
                return Err(SessionError::AlreadyExists(session_id));
            }
            sessions.insert(
                session_id.clone(),
                Arc::new(Session {
                    id: session_id.clone(),
                    lanes: lanes.clone(),
                    started_at: safe_unix_millis(),
                    runtime: Mutex::new(SessionRuntime {
                        pipeline,
                        frames_received: 0,
                        last_processed_at: None,
                        stopped: false,
                    }),
                }),
            );
        }

        CONGESTION_ACTIVE_SESSIONS.inc();
        info!(session_id = %session_id, lanes = ?lanes, "Started congestion session");
        Ok(session_id)
    }

    /// Remove a session and everything recorded for it.
    ///
    /// The session's runtime lock is held throughout, so a frame in flight either completes
    /// before the stop or is refused after it.
    pub async fn stop_session(&self, session_id: &str) -> Result<(), SessionError> {
        let session = match self.session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                CONGESTION_SESSION_OPERATIONS
                    .with_label_values(&["stop", "error"])
                    .inc();
                return Err(e);
            }
        };

        let mut runtime = session.runtime.lock().await;
        if runtime.stopped {
            CONGESTION_SESSION_OPERATIONS
                .with_label_values(&["stop", "error"])
                .inc();
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        runtime.stopped = true;
        self.inner.sessions.write().await.remove(session_id);

        if let Err(e) = self.inner.sink.forget(session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to drop retained results");
        }

        CONGESTION_ACTIVE_SESSIONS.dec();
        CONGESTION_TRACKED_IDS.remove_label_values(&[session_id]).ok();
        for lane in &session.lanes {
            CONGESTION_LANE_DENSITY_RATIO
                .remove_label_values(&[session_id, lane])
                .ok();
            CONGESTION_LANE_AVG_SPEED
                .remove_label_values(&[session_id, lane])
                .ok();
        }
        drop(runtime);

        CONGESTION_SESSION_OPERATIONS
            .with_label_values(&["stop", "success"])
            .inc();

        info!(session_id = %session_id, "Stopped congestion session");
        Ok(())
    }

    /// Run one tracked frame through a session's pipeline.
    ///
    /// Frames without a timestamp are stamped with the receive time. Returns `Ok(None)` when
    /// the frame falls between strides.
    pub async fn process_frame(
        &self,
        session_id: &str,
        mut frame: TrackedFrame,
    ) -> Result<Option<FrameReport>, SessionError> {
        if let Err(e) = validate_tracked_frame(&frame) {
            CONGESTION_FRAMES.with_label_values(&["rejected"]).inc();
            return Err(SessionError::Invalid(e));
        }
        frame.timestamp_ms.get_or_insert_with(safe_unix_millis);

        let session = self.session(session_id).await?;

        // Held until the results are recorded so a concurrent stop cannot interleave
        let mut runtime = session.runtime.lock().await;
        if runtime.stopped {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        runtime.frames_received += 1;

        let timer = CONGESTION_FRAME_PROCESSING_TIME.start_timer();
        let report = runtime.pipeline.process_frame(&frame);
        timer.observe_duration();

        let Some(report) = report else {
            CONGESTION_FRAMES.with_label_values(&["skipped"]).inc();
            debug!(session_id = %session_id, frame_index = frame.frame_index, "Skipped frame");
            return Ok(None);
        };
        runtime.last_processed_at = Some(safe_unix_millis());
        let tracked_ids = runtime.pipeline.tracked_ids();

        CONGESTION_FRAMES.with_label_values(&["processed"]).inc();
        CONGESTION_TRACKED_IDS
            .with_label_values(&[session_id])
            .set(tracked_ids as i64);
        for lane in &report.lanes {
            CONGESTION_LANE_DENSITY_RATIO
                .with_label_values(&[session_id, &lane.lane])
                .set(lane.density_ratio);
            CONGESTION_LANE_AVG_SPEED
                .with_label_values(&[session_id, &lane.lane])
                .set(lane.avg_speed);
            CONGESTION_LANE_STATE
                .with_label_values(&[&lane.lane, lane.congestion_state.as_str()])
                .inc();
        }

        let sink = self.inner.sink.name();
        match self.inner.sink.record(session_id, &report).await {
            Ok(()) => CONGESTION_SINK_WRITES
                .with_label_values(&[sink, "success"])
                .inc(),
            Err(e) => {
                CONGESTION_SINK_WRITES
                    .with_label_values(&[sink, "error"])
                    .inc();
                warn!(session_id = %session_id, sink, error = %e, "Failed to record lane results");
            }
        }
        drop(runtime);

        info!(
            session_id = %session_id,
            frame_index = report.frame_index,
            lanes = report.lanes.len(),
            unassigned = report.unassigned,
            tracked_ids,
            "Processed frame"
        );

        Ok(Some(report))
    }

    pub async fn lane_states(&self, session_id: &str) -> Result<LaneStatusResponse, SessionError> {
        let session = self.session(session_id).await?;
        let runtime = session.runtime.lock().await;
        Ok(LaneStatusResponse {
            session_id: session_id.to_string(),
            lanes: runtime.pipeline.lane_states(),
        })
    }

    /// Reinitialise every lane window and the track history of a session.
    ///
    /// Results retained by the sink are dropped too, so trends restart from the reset.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), SessionError> {
        let session = self.session(session_id).await?;
        let mut runtime = session.runtime.lock().await;
        if runtime.stopped {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        runtime.pipeline.reset();
        self.inner
            .sink
            .forget(session_id)
            .await
            .map_err(SessionError::Sink)?;
        drop(runtime);

        CONGESTION_SESSION_OPERATIONS
            .with_label_values(&["reset", "success"])
            .inc();
        info!(session_id = %session_id, "Reset congestion session");
        Ok(())
    }

    /// Up to `limit` retained records of a session lane, oldest first
    async fn lane_records(
        &self,
        session_id: &str,
        lane: &str,
        limit: usize,
    ) -> Result<Vec<LaneRecord>, SessionError> {
        let session = self.session(session_id).await?;
        if !session.lanes.iter().any(|l| l == lane) {
            return Err(SessionError::LaneNotFound {
                session: session_id.to_string(),
                lane: lane.to_string(),
            });
        }

        self.inner
            .sink
            .recent(session_id, lane, limit)
            .await
            .map_err(SessionError::Sink)
    }

    pub async fn lane_trend(
        &self,
        session_id: &str,
        lane: &str,
    ) -> Result<LaneTrendResponse, SessionError> {
        let records = self.lane_records(session_id, lane, TREND_WINDOW).await?;
        let results = lane_results(records);

        Ok(LaneTrendResponse {
            session_id: session_id.to_string(),
            lane: lane.to_string(),
            trend: congestion_trend(&results),
            samples: results.len(),
        })
    }

    pub async fn lane_forecast(
        &self,
        session_id: &str,
        lane: &str,
        minutes_ahead: f64,
    ) -> Result<LaneForecastResponse, SessionError> {
        if !(minutes_ahead.is_finite() && minutes_ahead >= 0.0) {
            return Err(SessionError::Invalid(anyhow::anyhow!(
                "minutes_ahead must be a non-negative number (got {})",
                minutes_ahead
            )));
        }

        let records = self.lane_records(session_id, lane, FORECAST_WINDOW).await?;
        let results = lane_results(records);
        let forecast = forecast_vehicle_count(&results, minutes_ahead);

        Ok(LaneForecastResponse {
            session_id: session_id.to_string(),
            lane: lane.to_string(),
            minutes_ahead,
            predicted_vehicle_count: forecast.vehicle_count,
            method: forecast.method,
            samples: results.len(),
        })
    }

    pub async fn lane_peak_hours(
        &self,
        session_id: &str,
        lane: &str,
    ) -> Result<LanePeakHoursResponse, SessionError> {
        let records = self.lane_records(session_id, lane, PEAK_HOURS_WINDOW).await?;
        let peak = peak_hours(records.iter().filter_map(|record| {
            record
                .timestamp_ms
                .map(|ts| (ts, record.result.vehicle_count))
        }));

        Ok(LanePeakHoursResponse {
            session_id: session_id.to_string(),
            lane: lane.to_string(),
            peak_hour: peak.peak_hour,
            average_vehicle_count: peak.average_vehicle_count,
            hourly: peak.hourly,
            samples: peak.samples,
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down congestion service...");

        let session_ids: Vec<String> = {
            let sessions = self.inner.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        for session_id in session_ids {
            if let Err(e) = self.stop_session(&session_id).await {
                warn!("Error stopping session {} during shutdown: {}", session_id, e);
            }
        }

        info!("Congestion service shutdown complete");
    }
}

fn lane_results(records: Vec<LaneRecord>) -> Vec<LaneResult> {
    records.into_iter().map(|record| record.result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryResultSink;
    use crate::source::SyntheticTraffic;
    use common::traffic::{CongestionState, ForecastMethod};
    use serde_json::json;

    fn state() -> CongestionServiceState {
        CongestionServiceState::new("test-node".to_string(), Arc::new(MemoryResultSink::default()))
    }

    fn request(id: &str, config: serde_json::Value) -> SessionStartRequest {
        SessionStartRequest {
            id: id.to_string(),
            calibration: json!({
                "lane_1": [[0, 0], [600, 0], [600, 600], [0, 600]],
                "lane_2": [[600, 0], [1200, 0], [1200, 600], [600, 600]]
            }),
            config,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = state();
        let id = state.start_session(request("cam-1", json!({}))).await.unwrap();
        assert_eq!(id, "cam-1");

        assert!(matches!(
            state.start_session(request("cam-1", json!({}))).await,
            Err(SessionError::AlreadyExists(_))
        ));

        let info = state.get_session("cam-1").await.unwrap();
        assert_eq!(info.lanes, vec!["lane_1", "lane_2"]);
        assert_eq!(info.frames_received, 0);
        assert_eq!(state.list_sessions().await.len(), 1);

        state.stop_session("cam-1").await.unwrap();
        assert!(state.get_session("cam-1").await.is_none());
        assert!(matches!(
            state.stop_session("cam-1").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_session_rejected() {
        let state = state();
        let mut bad = request("cam-1", json!({}));
        bad.calibration = json!({"lane_1": [[0, 0], [10, 10], [10, 0], [0, 20]]});
        assert!(matches!(
            state.start_session(bad).await,
            Err(SessionError::Invalid(_))
        ));

        assert!(matches!(
            state.start_session(request("cam-1", json!({"window_size": 0}))).await,
            Err(SessionError::Invalid(_))
        ));
        assert!(matches!(
            state.start_session(request("../cam", json!({}))).await,
            Err(SessionError::Invalid(_))
        ));
        assert!(state.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_frames_flow_to_sink_and_trend() {
        let state = state();
        state
            .start_session(request("cam-1", json!({"frame_stride": 2})))
            .await
            .unwrap();

        let traffic = SyntheticTraffic::new(3, 20).velocity(1.0, 0.0);
        let mut processed = 0;
        for frame in traffic {
            if state.process_frame("cam-1", frame).await.unwrap().is_some() {
                processed += 1;
            }
        }
        assert_eq!(processed, 10);

        let info = state.get_session("cam-1").await.unwrap();
        assert_eq!(info.frames_received, 20);
        assert_eq!(info.frames_processed, 10);
        assert_eq!(info.tracked_ids, 3);

        let trend = state.lane_trend("cam-1", "lane_1").await.unwrap();
        assert_eq!(trend.samples, 10);

        assert!(matches!(
            state.lane_trend("cam-1", "lane_9").await,
            Err(SessionError::LaneNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_lanes_to_unknown() {
        let state = state();
        state.start_session(request("cam-1", json!({}))).await.unwrap();
        state
            .process_frame("cam-1", SyntheticTraffic::new(2, 1).frame_at(0))
            .await
            .unwrap();

        let lanes = state.lane_states("cam-1").await.unwrap();
        assert_eq!(lanes.lanes[0].window_len, 1);

        assert_eq!(state.lane_trend("cam-1", "lane_1").await.unwrap().samples, 1);

        state.reset_session("cam-1").await.unwrap();
        let lanes = state.lane_states("cam-1").await.unwrap();
        assert!(lanes
            .lanes
            .iter()
            .all(|l| l.congestion_state == CongestionState::Unknown));
        assert_eq!(state.lane_trend("cam-1", "lane_1").await.unwrap().samples, 0);
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn session_series_present(session_id: &str) -> bool {
        let metrics = telemetry::metrics::encode_metrics().unwrap();
        metrics.contains(&format!("session=\"{}\"", session_id))
    }

    #[tokio::test]
    async fn test_in_flight_frame_completes_before_stop() {
        let state = state();
        state.start_session(request("cam-inflight", json!({}))).await.unwrap();
        let session = state.session("cam-inflight").await.unwrap();
        let guard = session.runtime.lock().await;

        let frame_task = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .process_frame("cam-inflight", SyntheticTraffic::new(2, 1).frame_at(0))
                    .await
            })
        };
        settle().await;
        let stop_task = {
            let state = state.clone();
            tokio::spawn(async move { state.stop_session("cam-inflight").await })
        };
        settle().await;
        drop(guard);

        let processed = frame_task.await.unwrap();
        stop_task.await.unwrap().unwrap();
        assert!(matches!(processed, Ok(Some(_)) | Err(SessionError::NotFound(_))));

        assert!(state.get_session("cam-inflight").await.is_none());
        assert!(state
            .sink()
            .recent("cam-inflight", "lane_1", 10)
            .await
            .unwrap()
            .is_empty());
        assert!(!session_series_present("cam-inflight"));
    }

    #[tokio::test]
    async fn test_frame_queued_behind_stop_is_refused() {
        let state = state();
        state.start_session(request("cam-queued", json!({}))).await.unwrap();
        let session = state.session("cam-queued").await.unwrap();
        let guard = session.runtime.lock().await;

        let stop_task = {
            let state = state.clone();
            tokio::spawn(async move { state.stop_session("cam-queued").await })
        };
        settle().await;
        let frame_task = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .process_frame("cam-queued", SyntheticTraffic::new(2, 1).frame_at(0))
                    .await
            })
        };
        settle().await;
        drop(guard);

        stop_task.await.unwrap().unwrap();
        assert!(matches!(
            frame_task.await.unwrap(),
            Err(SessionError::NotFound(_))
        ));
        assert!(state
            .sink()
            .recent("cam-queued", "lane_1", 10)
            .await
            .unwrap()
            .is_empty());
        assert!(!session_series_present("cam-queued"));
        assert!(matches!(
            state.stop_session("cam-queued").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_forecast_and_peak_hours() {
        let state = state();
        state.start_session(request("cam-1", json!({}))).await.unwrap();

        for frame in SyntheticTraffic::new(4, 3).with_fps(10.0) {
            state.process_frame("cam-1", frame).await.unwrap();
        }

        let forecast = state.lane_forecast("cam-1", "lane_1", 15.0).await.unwrap();
        assert_eq!(forecast.method, ForecastMethod::Default);
        assert_eq!(forecast.predicted_vehicle_count, 25);
        assert_eq!(forecast.samples, 3);
        assert!(matches!(
            state.lane_forecast("cam-1", "lane_1", -5.0).await,
            Err(SessionError::Invalid(_))
        ));

        // Synthetic timestamps start at the epoch
        let peak = state.lane_peak_hours("cam-1", "lane_1").await.unwrap();
        assert_eq!(peak.peak_hour, Some(0));
        assert_eq!(peak.samples, 3);
        assert_eq!(peak.average_vehicle_count, 4.0);

        assert!(matches!(
            state.lane_peak_hours("cam-1", "lane_3").await,
            Err(SessionError::LaneNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_untimed_frames_are_stamped() {
        let state = state();
        state.start_session(request("cam-1", json!({}))).await.unwrap();

        let frame = SyntheticTraffic::new(1, 1).frame_at(0);
        assert!(frame.timestamp_ms.is_none());
        let report = state.process_frame("cam-1", frame).await.unwrap().unwrap();
        assert!(report.timestamp_ms.is_some());
    }

    #[tokio::test]
    async fn test_malformed_frame_rejected() {
        let state = state();
        state.start_session(request("cam-1", json!({}))).await.unwrap();

        let mut frame = SyntheticTraffic::new(1, 1).frame_at(0);
        frame.objects[0].bbox.x2 = frame.objects[0].bbox.x1 - 1.0;
        assert!(matches!(
            state.process_frame("cam-1", frame).await,
            Err(SessionError::Invalid(_))
        ));
        assert!(matches!(
            state.process_frame("cam-2", TrackedFrame::default()).await,
            Err(SessionError::NotFound(_))
        ));
    }
}

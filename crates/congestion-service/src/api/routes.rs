use crate::state::{CongestionServiceState, SessionError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::traffic::{
    FrameSubmitResponse, SessionStartRequest, SessionStartResponse, SessionStopResponse,
    TrackedFrame,
};
use serde::Deserialize;
use serde_json::json;

fn default_minutes_ahead() -> f64 {
    15.0
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    #[serde(default = "default_minutes_ahead")]
    pub minutes_ahead: f64,
}

fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) | SessionError::LaneNotFound { .. } => StatusCode::NOT_FOUND,
        SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
        SessionError::Invalid(_) => StatusCode::BAD_REQUEST,
        SessionError::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: SessionError) -> Response {
    (
        status_for(&err),
        Json(json!({
            "error": err.to_string()
        })),
    )
        .into_response()
}

/// Start a new congestion session
pub async fn start_session(
    State(state): State<CongestionServiceState>,
    Json(request): Json<SessionStartRequest>,
) -> impl IntoResponse {
    match state.start_session(request).await {
        Ok(session_id) => {
            let response = SessionStartResponse {
                accepted: true,
                session_id: Some(session_id.clone()),
                message: Some(format!("Session '{}' started successfully", session_id)),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            tracing::error!("Failed to start session: {}", e);
            let response = SessionStartResponse {
                accepted: false,
                session_id: None,
                message: Some(format!("Failed to start session: {}", e)),
            };
            (status_for(&e), Json(response))
        }
    }
}

/// Stop a session and drop its state
pub async fn stop_session(
    State(state): State<CongestionServiceState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.stop_session(&session_id).await {
        Ok(()) => {
            let response = SessionStopResponse {
                success: true,
                message: Some(format!("Session '{}' stopped successfully", session_id)),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            tracing::error!("Failed to stop session {}: {}", session_id, e);
            let response = SessionStopResponse {
                success: false,
                message: Some(format!("Failed to stop session: {}", e)),
            };
            (status_for(&e), Json(response))
        }
    }
}

/// Get information about a specific session
pub async fn get_session(
    State(state): State<CongestionServiceState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.get_session(&session_id).await {
        Some(info) => (StatusCode::OK, Json(info)).into_response(),
        None => error_response(SessionError::NotFound(session_id)),
    }
}

/// List all sessions
pub async fn list_sessions(State(state): State<CongestionServiceState>) -> impl IntoResponse {
    let sessions = state.list_sessions().await;
    (StatusCode::OK, Json(json!({ "sessions": sessions })))
}

/// Submit one frame of tracked objects
pub async fn submit_frame(
    State(state): State<CongestionServiceState>,
    Path(session_id): Path<String>,
    Json(frame): Json<TrackedFrame>,
) -> impl IntoResponse {
    match state.process_frame(&session_id, frame).await {
        Ok(report) => {
            let response = FrameSubmitResponse {
                processed: report.is_some(),
                report,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            tracing::warn!("Failed to process frame for session {}: {}", session_id, e);
            error_response(e)
        }
    }
}

/// Current congestion state of every lane
pub async fn lane_states(
    State(state): State<CongestionServiceState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.lane_states(&session_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Clear congestion windows and track history
pub async fn reset_session(
    State(state): State<CongestionServiceState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.reset_session(&session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "session_id": session_id
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Vehicle-count trend of one lane
pub async fn lane_trend(
    State(state): State<CongestionServiceState>,
    Path((session_id, lane)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.lane_trend(&session_id, &lane).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Forecast vehicle count of one lane
pub async fn lane_forecast(
    State(state): State<CongestionServiceState>,
    Path((session_id, lane)): Path<(String, String)>,
    Query(query): Query<ForecastQuery>,
) -> impl IntoResponse {
    match state
        .lane_forecast(&session_id, &lane, query.minutes_ahead)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Busiest hour of day of one lane
pub async fn lane_peak_hours(
    State(state): State<CongestionServiceState>,
    Path((session_id, lane)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.lane_peak_hours(&session_id, &lane).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "congestion-service",
            "version": common::VERSION
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<CongestionServiceState>) -> impl IntoResponse {
    let sessions = state.list_sessions().await.len();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "node_id": state.node_id(),
            "sink": state.sink().name(),
            "sessions": sessions
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
